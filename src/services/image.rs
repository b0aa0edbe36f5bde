//! Product image normalisation.
//!
//! Uploaded images are decoded, re-encoded as JPEG and stored base64 encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use image::codecs::jpeg::JpegEncoder;
use std::io::Cursor;
use thiserror::Error;

pub const JPEG_QUALITY: u8 = 75;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("Unsupported or corrupt image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Image worker failed: {0}")]
    Worker(String),
}

/// Decodes any supported format and re-encodes it as JPEG.
pub fn reencode_jpeg(bytes: &[u8]) -> Result<Vec<u8>, ImageError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;

    // JPEG has no alpha channel
    let rgb = decoded.to_rgb8();

    let mut out = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| ImageError::Encode(e.to_string()))?;

    Ok(out.into_inner())
}

/// Re-encodes a batch of uploads off the async runtime and returns them
/// base64 encoded, in order.
pub async fn encode_uploads(uploads: Vec<Vec<u8>>) -> Result<Vec<String>, ImageError> {
    tokio::task::spawn_blocking(move || {
        uploads
            .iter()
            .map(|bytes| reencode_jpeg(bytes).map(|jpeg| STANDARD.encode(jpeg)))
            .collect()
    })
    .await
    .map_err(|e| ImageError::Worker(e.to_string()))?
}

#[must_use]
pub fn is_jpeg(bytes: &[u8]) -> bool {
    image::guess_format(bytes).is_ok_and(|format| format == ImageFormat::Jpeg)
}
