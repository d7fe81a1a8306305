//! Pipeline stages for turning room photos into a conceptual drawing.
//!
//! Each submodule implements exactly one transformation step. Stages do not
//! touch the session store; [`crate::workflow`] sequences them and writes
//! the results back.
//!
//! ## Data Flow
//!
//! ```text
//! upload ──▶ vision ──▶ compose ──▶ render ──▶ imagegen ──▶ pdf
//! (multipart) (LLM,opt) (describe)  (raster)   (remote,opt) (A4)
//! ```
//!
//! 1. [`upload`]   validate the multipart batch and probe image headers
//! 2. [`vision`]   optional layout analysis by a vision model; failures
//!    become `None`
//! 3. [`compose`]  pure mapping from form + analysis to a drawing description
//! 4. [`render`]   1200×800 PNG schematic; runs in `spawn_blocking`
//! 5. [`imagegen`] optional replacement image from a hosted generator
//! 6. [`pdf`]      one-page A4 report from the drawing description
//!
//! [`encode`] holds the byte-level helpers shared by several stages.

pub mod compose;
pub mod encode;
pub mod imagegen;
pub mod pdf;
pub mod render;
pub mod upload;
pub mod vision;
