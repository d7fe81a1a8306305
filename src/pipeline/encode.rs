//! Image encoding helpers.
//!
//! * uploads → base64 [`ImageData`] for the vision request body
//! * uploads → `data:` URI for the Gradio image-to-image call
//! * rendered canvas → PNG bytes
//! * arbitrary bytes → MIME type for the drawing-image response

use crate::model::UploadedImage;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Wrap an uploaded photo for a multimodal chat request.
///
/// The original bytes are sent as-is with their real MIME type.
/// `detail: "high"` keeps small fixtures such as taps and sockets visible
/// to OpenAI-class models; other providers ignore it.
pub fn encode_upload(image: &UploadedImage) -> ImageData {
    let b64 = STANDARD.encode(&image.data);
    debug!(
        "Encoded '{}' → {} bytes base64",
        image.filename,
        b64.len()
    );
    ImageData::new(b64, image.kind.mime_type()).with_detail("high")
}

/// `data:<mime>;base64,<payload>` for JSON APIs that take inline images.
pub fn data_uri(image: &UploadedImage) -> String {
    format!(
        "data:{};base64,{}",
        image.kind.mime_type(),
        STANDARD.encode(&image.data)
    )
}

/// Encode a rendered canvas as PNG.
pub fn encode_png(img: RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}

/// MIME type sniffed from magic bytes; PNG when unknown.
pub fn sniff_mime(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Gif) => "image/gif",
        _ => "image/png",
    }
}
