//! Upload validation: multipart parts → [`UploadedImage`]s.
//!
//! Rules, applied in order:
//! 1. no `images` field → [`MarmoError::NoImages`]
//! 2. an empty file list → [`MarmoError::EmptyUpload`]
//! 3. more than `max_files` → [`MarmoError::TooManyFiles`]
//! 4. per file: a disallowed extension is skipped silently, an oversized
//!    file rejects the whole batch, and undecodable bytes are rejected.
//!
//! Only the image header is probed for format and dimensions; the stored
//! bytes are exactly what the client sent.

use crate::config::ServerConfig;
use crate::error::MarmoError;
use crate::model::{FormInput, ImageKind, UploadedImage};
use bytes::Bytes;
use image::{ImageFormat, ImageReader};
use once_cell::sync::Lazy;
use regex::Regex;
use std::io::Cursor;
use tracing::{debug, warn};

/// One raw file part as received.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub data: Bytes,
}

/// Everything read from the multipart body.
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    /// `None` when the body had no `images` field at all.
    pub files: Option<Vec<UploadFile>>,
    pub form: FormInput,
}

impl UploadRequest {
    /// Record a file part, creating the list on first use.
    pub fn push_file(&mut self, file: UploadFile) {
        self.files.get_or_insert_with(Vec::new).push(file);
    }
}

/// Validate a parsed upload and produce the session's images and form.
pub fn ingest(
    request: UploadRequest,
    config: &ServerConfig,
) -> Result<(Vec<UploadedImage>, FormInput), MarmoError> {
    let files = request.files.ok_or(MarmoError::NoImages)?;
    if files.is_empty() {
        return Err(MarmoError::EmptyUpload);
    }
    if files.len() > config.max_files {
        return Err(MarmoError::TooManyFiles {
            max: config.max_files,
        });
    }

    let mut images = Vec::with_capacity(files.len());
    for file in files {
        if !has_allowed_extension(&file.filename, &config.allowed_extensions) {
            debug!("Skipping '{}': extension not allowed", file.filename);
            continue;
        }
        if file.data.len() > config.max_file_size {
            return Err(MarmoError::FileTooLarge {
                filename: file.filename,
                limit_mb: config.max_file_size_mb(),
            });
        }
        images.push(probe(file)?);
    }

    let mut form = request.form;
    form.timestamp = chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string();

    debug!("Accepted {} image(s)", images.len());
    Ok((images, form))
}

/// Read format and dimensions from the header without a full decode.
fn probe(file: UploadFile) -> Result<UploadedImage, MarmoError> {
    let invalid = || MarmoError::InvalidImage {
        filename: file.filename.clone(),
    };

    let reader = ImageReader::new(Cursor::new(&file.data[..]))
        .with_guessed_format()
        .map_err(|_| invalid())?;
    let kind = match reader.format() {
        Some(ImageFormat::Png) => ImageKind::Png,
        Some(ImageFormat::Jpeg) => ImageKind::Jpeg,
        other => {
            warn!("Rejecting '{}': unsupported format {other:?}", file.filename);
            return Err(invalid());
        }
    };
    let (width, height) = reader.into_dimensions().map_err(|e| {
        warn!("Rejecting '{}': {e}", file.filename);
        invalid()
    })?;

    Ok(UploadedImage {
        filename: sanitize_filename(&file.filename),
        data: file.data,
        width,
        height,
        kind,
    })
}

fn has_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .is_some_and(|ext| allowed.iter().any(|a| *a == ext))
}

static RE_UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").unwrap());

/// Reduce a client-supplied filename to a safe basename.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let spaced = base.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = RE_UNSAFE_CHARS.replace_all(&spaced, "");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn png_bytes(w: u32, h: u32) -> Bytes {
        let img = DynamicImage::ImageRgb8(RgbImage::new(w, h));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        Bytes::from(buf)
    }

    fn file(name: &str, data: Bytes) -> UploadFile {
        UploadFile {
            filename: name.to_string(),
            data,
        }
    }

    fn request(files: Vec<UploadFile>) -> UploadRequest {
        UploadRequest {
            files: Some(files),
            form: FormInput::default(),
        }
    }

    #[test]
    fn missing_field_and_empty_list_are_distinct() {
        let c = ServerConfig::default();
        assert!(matches!(
            ingest(UploadRequest::default(), &c),
            Err(MarmoError::NoImages)
        ));
        assert!(matches!(
            ingest(request(vec![]), &c),
            Err(MarmoError::EmptyUpload)
        ));
    }

    #[test]
    fn six_files_are_rejected() {
        let c = ServerConfig::default();
        let files = (0..6).map(|i| file(&format!("{i}.png"), png_bytes(2, 2))).collect();
        assert!(matches!(
            ingest(request(files), &c),
            Err(MarmoError::TooManyFiles { max: 5 })
        ));
    }

    #[test]
    fn disallowed_extensions_are_skipped() {
        let c = ServerConfig::default();
        let (images, _) = ingest(
            request(vec![
                file("notes.txt", Bytes::from_static(b"hello")),
                file("Foto.PNG", png_bytes(8, 6)),
            ]),
            &c,
        )
        .unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!((images[0].width, images[0].height), (8, 6));
        assert_eq!(images[0].kind, ImageKind::Png);
    }

    #[test]
    fn oversized_file_rejects_batch() {
        let c = ServerConfig::builder().max_file_size(16).build().unwrap();
        let err = ingest(request(vec![file("big.png", png_bytes(20, 20))]), &c).unwrap_err();
        assert!(matches!(err, MarmoError::FileTooLarge { ref filename, .. } if filename == "big.png"));
    }

    #[test]
    fn garbage_with_image_extension_is_invalid() {
        let c = ServerConfig::default();
        let err = ingest(
            request(vec![file("fake.jpg", Bytes::from_static(b"not an image"))]),
            &c,
        )
        .unwrap_err();
        assert!(matches!(err, MarmoError::InvalidImage { .. }));
    }

    #[test]
    fn bytes_are_stored_unmodified() {
        let c = ServerConfig::default();
        let data = png_bytes(3, 3);
        let (images, form) = ingest(request(vec![file("a.png", data.clone())]), &c).unwrap();
        assert_eq!(images[0].data, data);
        assert!(!form.timestamp.is_empty());
    }

    #[test]
    fn filenames_are_sanitized() {
        assert_eq!(sanitize_filename("../../etc/passwd.png"), "passwd.png");
        assert_eq!(sanitize_filename("C:\\fotos\\minha foto.jpg"), "minha_foto.jpg");
        assert_eq!(sanitize_filename("..."), "upload");
        assert_eq!(sanitize_filename("cozinha (1).png"), "cozinha_1.png");
    }
}
