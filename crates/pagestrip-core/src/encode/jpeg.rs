//! JPEG encoding of cropped strips.
//!
//! Each strip is shipped to the remote store as its own JPEG file. Encoding
//! goes through the `image` crate's baseline encoder with a configurable
//! quality.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};
use thiserror::Error;

use crate::decode::DecodedImage;

/// Errors that can occur during JPEG encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Pixel data length doesn't match expected dimensions
    #[error("Invalid pixel data: expected {expected} bytes (width * height * 3), got {actual}")]
    InvalidPixelData { expected: usize, actual: usize },

    /// Width or height is zero
    #[error("Invalid dimensions: width ({width}) and height ({height}) must be non-zero")]
    InvalidDimensions { width: u32, height: u32 },

    /// JPEG exceeds the baseline size limit on one edge
    #[error("Image too large for JPEG: {width}x{height} (max 65535 per edge)")]
    TooLarge { width: u32, height: u32 },

    /// JPEG encoding failed
    #[error("JPEG encoding failed: {0}")]
    EncodingFailed(String),
}

const JPEG_MAX_EDGE: u32 = u16::MAX as u32;

/// Encode a strip image as JPEG bytes.
///
/// `quality` is clamped to 1..=100.
///
/// # Errors
///
/// Returns an `EncodeError` if the image is empty, its buffer is
/// inconsistent, it is too large for JPEG, or the encoder fails.
pub fn encode_jpeg(image: &DecodedImage, quality: u8) -> Result<Vec<u8>, EncodeError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(EncodeError::InvalidDimensions { width, height });
    }
    if width > JPEG_MAX_EDGE || height > JPEG_MAX_EDGE {
        return Err(EncodeError::TooLarge { width, height });
    }

    let expected = image.row_stride() * height as usize;
    if image.pixels.len() != expected {
        return Err(EncodeError::InvalidPixelData {
            expected,
            actual: image.pixels.len(),
        });
    }

    let mut buffer = Vec::with_capacity(expected / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
        .write_image(&image.pixels, width, height, ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::EncodingFailed(e.to_string()))?;

    Ok(buffer)
}


// ============================================================================
// Property-Based Tests
// ============================================================================
