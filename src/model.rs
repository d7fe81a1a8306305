//! Data types shared by the pipeline stages and the HTTP layer.
//!
//! A [`Session`] is created by an upload and only grows afterwards: the
//! drawing, the rendered image and the vision analysis are added or replaced,
//! never removed. [`SessionStatus`] moves forward only.

use crate::analysis::VisionAnalysis;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

// ── Identifiers ──────────────────────────────────────────────────────────

/// Opaque session identifier (a UUID v4 string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First `n` characters, used in filenames and footers.
    pub fn short(&self, n: usize) -> &str {
        prefix_chars(&self.0, n)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for SessionId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// The longest prefix of `s` holding at most `n` characters.
pub(crate) fn prefix_chars(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ── Uploads ──────────────────────────────────────────────────────────────

/// Raster format detected from the upload's header bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }
}

/// A validated upload. `data` holds the original bytes, untouched.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub kind: ImageKind,
}

/// Form fields submitted alongside the photos.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormInput {
    #[serde(default)]
    pub characteristics: String,
    #[serde(rename = "envType", default)]
    pub env_type: String,
    #[serde(rename = "stoneElements", default)]
    pub stone_elements: Vec<String>,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub cutouts: Vec<String>,
    /// Local ISO-8601 time at ingestion.
    #[serde(default)]
    pub timestamp: String,
}

impl FormInput {
    /// Element tags, unless the list is empty or explicitly `nenhum`.
    pub fn active_elements(&self) -> &[String] {
        active_tags(&self.stone_elements)
    }

    /// Cutout tags, unless the list is empty or explicitly `nenhum`.
    pub fn active_cutouts(&self) -> &[String] {
        active_tags(&self.cutouts)
    }
}

/// `tags`, or nothing when the first tag is `nenhum`.
pub(crate) fn active_tags(tags: &[String]) -> &[String] {
    match tags.first() {
        Some(first) if first == "nenhum" => &[],
        _ => tags,
    }
}

// ── Catalogue of codes ───────────────────────────────────────────────────

/// Room type selected in the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Kitchen,
    CommercialKitchen,
    Bathroom,
    GourmetArea,
    PowderRoom,
    LivingRoom,
    Balcony,
    Other,
}

impl Environment {
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "cozinha" => Self::Kitchen,
            "cozinha-comercial" => Self::CommercialKitchen,
            "banheiro" => Self::Bathroom,
            "area-gourmet" => Self::GourmetArea,
            "lavabo" => Self::PowderRoom,
            "sala" => Self::LivingRoom,
            "varanda" => Self::Balcony,
            "outro" => Self::Other,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Kitchen => "Cozinha Residencial",
            Self::CommercialKitchen => "Cozinha Comercial",
            Self::Bathroom => "Banheiro",
            Self::GourmetArea => "Área Gourmet",
            Self::PowderRoom => "Lavabo",
            Self::LivingRoom => "Sala",
            Self::Balcony => "Varanda/Sacada",
            Self::Other => "Outro",
        }
    }

    /// Label for an arbitrary code; unknown codes read "Não especificado".
    pub fn label_for(code: &str) -> &'static str {
        Self::from_code(code).map_or(UNSPECIFIED, Self::label)
    }
}

/// Countertop layout selected in the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutFormat {
    Linear,
    LShape,
    UShape,
    Island,
    Peninsula,
    Irregular,
    Other,
}

impl LayoutFormat {
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "reto" => Self::Linear,
            "l" => Self::LShape,
            "u" => Self::UShape,
            "ilha" => Self::Island,
            "pensula" => Self::Peninsula,
            "irregular" => Self::Irregular,
            "outro" => Self::Other,
            _ => return None,
        })
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Linear => "Reto/Linear",
            Self::LShape => "Em L",
            Self::UShape => "Em U",
            Self::Island => "Ilha Central",
            Self::Peninsula => "Península",
            Self::Irregular => "Irregular",
            Self::Other => "Outro",
        }
    }

    pub fn label_for(code: &str) -> &'static str {
        Self::from_code(code).map_or(UNSPECIFIED, Self::label)
    }
}

pub const UNSPECIFIED: &str = "Não especificado";

// ── Drawing ──────────────────────────────────────────────────────────────

/// One descriptive shape entry of a drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
}

impl Shape {
    pub(crate) fn new(kind: &str, description: &str) -> Self {
        Self {
            kind: kind.to_string(),
            description: description.to_string(),
        }
    }
}

/// Structured description of a conceptual drawing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawingDescription {
    pub title: String,
    pub environment: String,
    pub format: String,
    pub elements: Vec<String>,
    pub cutouts: Vec<String>,
    pub characteristics: String,
    pub images_analyzed: usize,
    pub shapes: Vec<Shape>,
    pub ai_analysis: Option<VisionAnalysis>,
    pub notes: Vec<String>,
}

// ── Session ──────────────────────────────────────────────────────────────

/// Workflow stage of a session. Ordered; only ever advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Uploaded,
    DrawingCreated,
    PdfGenerated,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    pub images: Vec<UploadedImage>,
    pub form: FormInput,
    pub status: SessionStatus,
    pub drawing: Option<DrawingDescription>,
    /// Final image bytes: the local render or a generated replacement.
    pub drawing_image: Option<Bytes>,
    pub ai_analysis: Option<VisionAnalysis>,
}

impl Session {
    pub fn new(id: SessionId, images: Vec<UploadedImage>, form: FormInput) -> Self {
        Self {
            id,
            created_at: Utc::now(),
            images,
            form,
            status: SessionStatus::Uploaded,
            drawing: None,
            drawing_image: None,
            ai_analysis: None,
        }
    }

    /// Move the status forward. Requests to go backwards are ignored.
    pub fn advance(&mut self, status: SessionStatus) {
        if status > self.status {
            self.status = status;
        }
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            created_at: self.created_at,
            status: self.status,
            images: self
                .images
                .iter()
                .map(|img| ImageSummary {
                    filename: img.filename.clone(),
                    width: img.width,
                    height: img.height,
                })
                .collect(),
            form: self.form.clone(),
            drawing: self.drawing.clone(),
            has_drawing_image: self.drawing_image.is_some(),
            ai_analysis: self.ai_analysis.clone(),
        }
    }
}

/// Image metadata without the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    pub filename: String,
    pub width: u32,
    pub height: u32,
}

/// Client-facing view of a session, free of binary payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub images: Vec<ImageSummary>,
    pub form: FormInput,
    pub drawing: Option<DrawingDescription>,
    pub has_drawing_image: bool,
    pub ai_analysis: Option<VisionAnalysis>,
}
