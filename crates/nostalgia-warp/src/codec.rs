//! Decoding uploads and encoding results.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

use crate::Result;

/// JPEG quality used for every locally produced image.
pub const JPEG_QUALITY: u8 = 95;

/// Decodes JPEG, PNG or WEBP bytes into an RGB image.
///
/// The format is sniffed from the content, not the file name.
///
/// # Errors
///
/// Returns [`crate::WarpError::Codec`] if the bytes are not a supported image.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(bytes)?;
    Ok(image.to_rgb8())
}

/// Encodes an RGB image as JPEG.
///
/// # Errors
///
/// Returns [`crate::WarpError::Codec`] if encoding fails.
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).encode_image(image)?;
    Ok(buf)
}

/// Encodes an RGB image as PNG.
///
/// # Errors
///
/// Returns [`crate::WarpError::Codec`] if encoding fails.
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
