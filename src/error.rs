//! Error types for the marmoview library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MarmoError`]: **Fatal** for the request. The upload is invalid, the
//!   session does not exist, or the drawing has not been generated yet.
//!   Every variant maps to an HTTP status through [`MarmoError::status`] and
//!   is rendered as `{"error": "..."}` by the server.
//!
//! * [`ExternalError`]: **Non-fatal**. An optional collaborator (vision
//!   model, image-generation service) failed. These are logged and the
//!   workflow falls back to its local path. They never reach HTTP callers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// All request-level errors returned by the marmoview library.
///
/// Display strings are the user-facing messages returned in the JSON body.
#[derive(Debug, Error)]
pub enum MarmoError {
    // ── Upload validation ─────────────────────────────────────────────────
    /// The multipart body had no `images` field at all.
    #[error("Nenhuma imagem enviada")]
    NoImages,

    /// The `images` field was present but carried no files.
    #[error("Lista de imagens vazia")]
    EmptyUpload,

    #[error("Máximo de {max} imagens permitido")]
    TooManyFiles { max: usize },

    /// One file exceeded the per-file size cap; the whole batch is rejected.
    #[error("Arquivo {filename} excede {limit_mb}MB")]
    FileTooLarge { filename: String, limit_mb: usize },

    /// An accepted extension whose bytes are not a decodable image header.
    #[error("Arquivo {filename} não é uma imagem válida")]
    InvalidImage { filename: String },

    /// The multipart stream itself could not be read.
    #[error("Requisição inválida: {0}")]
    InvalidUpload(String),

    // ── Session lifecycle ─────────────────────────────────────────────────
    #[error("Sessão não encontrada ou expirada")]
    SessionNotFound,

    /// PDF export requested before a drawing exists.
    #[error("Desenho não foi gerado ainda")]
    DrawingNotReady,

    /// Image download requested before a drawing exists.
    #[error("Desenho não foi gerado")]
    ImageNotGenerated,

    // ── Output errors ─────────────────────────────────────────────────────
    #[error("Falha ao renderizar o desenho: {0}")]
    RenderFailed(String),

    #[error("Falha ao gerar o PDF: {0}")]
    PdfFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Erro interno: {0}")]
    Internal(String),
}

impl MarmoError {
    /// HTTP status code for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoImages
            | Self::EmptyUpload
            | Self::TooManyFiles { .. }
            | Self::FileTooLarge { .. }
            | Self::InvalidImage { .. }
            | Self::InvalidUpload(_)
            | Self::DrawingNotReady => StatusCode::BAD_REQUEST,
            Self::SessionNotFound | Self::ImageNotGenerated => StatusCode::NOT_FOUND,
            Self::RenderFailed(_)
            | Self::PdfFailed(_)
            | Self::InvalidConfig(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MarmoError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {self}");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// A non-fatal failure of an optional external collaborator.
///
/// Produced by the vision analyzer and the image-generation client, logged
/// at `warn` level, and then discarded.
#[derive(Debug, Clone, Error)]
pub enum ExternalError {
    /// No credential or endpoint configured for this integration.
    #[error("{service}: not configured")]
    NotConfigured { service: &'static str },

    /// The remote call returned an error or a non-success status.
    #[error("{service}: call failed: {detail}")]
    CallFailed { service: &'static str, detail: String },

    #[error("{service}: timed out after {secs}s")]
    Timeout { service: &'static str, secs: u64 },

    /// The call succeeded but the payload could not be interpreted.
    #[error("{service}: unusable response: {detail}")]
    BadResponse { service: &'static str, detail: String },

    /// A referenced image (URL or local path) could not be fetched.
    #[error("{service}: could not fetch generated image: {detail}")]
    DownloadFailed { service: &'static str, detail: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_errors_are_bad_request() {
        assert_eq!(MarmoError::NoImages.status(), StatusCode::BAD_REQUEST);
        assert_eq!(MarmoError::EmptyUpload.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            MarmoError::TooManyFiles { max: 5 }.status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(MarmoError::DrawingNotReady.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_things_are_not_found() {
        assert_eq!(MarmoError::SessionNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(MarmoError::ImageNotGenerated.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn file_too_large_names_the_file() {
        let e = MarmoError::FileTooLarge {
            filename: "cozinha.jpg".into(),
            limit_mb: 10,
        };
        let msg = e.to_string();
        assert!(msg.contains("cozinha.jpg"), "got: {msg}");
        assert!(msg.contains("10MB"), "got: {msg}");
    }

    #[test]
    fn too_many_files_display() {
        let msg = MarmoError::TooManyFiles { max: 5 }.to_string();
        assert_eq!(msg, "Máximo de 5 imagens permitido");
    }

    #[test]
    fn external_timeout_display() {
        let e = ExternalError::Timeout {
            service: "vision",
            secs: 60,
        };
        assert!(e.to_string().contains("60s"));
        assert!(e.to_string().contains("vision"));
    }
}
