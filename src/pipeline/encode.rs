//! Image encoding: `DynamicImage` → base64 PNG, and base64 → data URI.
//!
//! Vision model endpoints accept images as base64 data URIs embedded in the
//! JSON request body. PNG is used for rendered pages because it is lossless;
//! JPEG artefacts on rendered text confuse vision models.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// PNG-encode an image and return the base64 payload.
pub fn encode_png(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        img.width(),
        img.height(),
        b64.len()
    );
    Ok(b64)
}

/// Base64-encode raw bytes that are already in a supported image format.
pub fn encode_bytes(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Wrap a base64 payload as a `data:` URI.
pub fn data_uri(mime_type: &str, base64_payload: &str) -> String {
    format!("data:{mime_type};base64,{base64_payload}")
}
