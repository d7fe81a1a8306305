//! # marmoview
//!
//! Conceptual stone-countertop drawings from room photos, served over HTTP.
//!
//! A stonework shop uploads a few photos of a kitchen or bathroom together
//! with a short form (room type, countertop layout, elements, cutouts). The
//! server produces a schematic raster drawing and a one-page PDF report. The
//! drawings are explicitly conceptual: they carry no scale and always tell
//! the reader to measure on site.
//!
//! ## Pipeline Overview
//!
//! ```text
//! photos + form
//!  │
//!  ├─ 1. Upload   validate batch, probe headers, create session
//!  ├─ 2. Vision   optional layout analysis by a vision LLM (edgequake-llm)
//!  ├─ 3. Compose  deterministic drawing description
//!  ├─ 4. Render   1200×800 PNG (CPU-bound, spawn_blocking)
//!  ├─ 5. ImageGen optional replacement from OpenAI Images / a Gradio space
//!  └─ 6. PDF      single A4 page report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use marmoview::{serve, AppState, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .bind_addr("127.0.0.1:5000".parse()?)
//!         .build()?;
//!     serve(AppState::new(config)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `marmoview` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analysis;
pub mod config;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod prompts;
pub mod server;
pub mod session;
pub mod workflow;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analysis::VisionAnalysis;
pub use config::{ImageGenConfig, ServerConfig, ServerConfigBuilder, VisionSettings};
pub use error::{ExternalError, MarmoError};
pub use model::{DrawingDescription, FormInput, Session, SessionId, SessionStatus, SessionSummary};
pub use pipeline::imagegen::ImageGenerator;
pub use pipeline::vision::VisionAnalyzer;
pub use server::{router, serve, AppState};
pub use session::SessionStore;
pub use workflow::{export_pdf, generate_drawing, DrawingOutcome};
