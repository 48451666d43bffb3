//! Pixel-exact strip cropping.
//!
//! Strips are described in integer source pixels by [`StripSpec`], so the
//! crop is a straight row-by-row copy with no rounding. Cropping every strip
//! of a partition and laying the results side by side reproduces the page.

use thiserror::Error;

use crate::decode::DecodedImage;
use crate::partition::StripSpec;

/// A strip could not be materialized from the page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CropError {
    /// The strip has zero width or height.
    #[error("strip {index} is empty")]
    EmptyStrip { index: usize },

    /// The strip reaches outside the page.
    #[error("strip {index} spans x {start}..{end} and height {height}, page is {page_width}x{page_height}")]
    OutOfBounds {
        index: usize,
        start: u32,
        end: u32,
        height: u32,
        page_width: u32,
        page_height: u32,
    },

    /// The page buffer length does not match its dimensions.
    #[error("page buffer holds {actual} bytes, expected {expected}")]
    BufferMismatch { expected: usize, actual: usize },
}

/// Copy the region described by `spec` out of `page` into a new image.
///
/// # Errors
///
/// Returns `CropError::EmptyStrip` for zero-sized strips and
/// `CropError::OutOfBounds` if the strip does not fit inside the page.
pub fn crop_strip(page: &DecodedImage, spec: &StripSpec) -> Result<DecodedImage, CropError> {
    if spec.is_empty() {
        return Err(CropError::EmptyStrip { index: spec.index });
    }

    let expected = page.row_stride() * page.height as usize;
    if page.pixels.len() != expected {
        return Err(CropError::BufferMismatch {
            expected,
            actual: page.pixels.len(),
        });
    }

    let end = u64::from(spec.offset_x) + u64::from(spec.width);
    if end > u64::from(page.width) || spec.height > page.height {
        return Err(CropError::OutOfBounds {
            index: spec.index,
            start: spec.offset_x,
            end: end.min(u64::from(u32::MAX)) as u32,
            height: spec.height,
            page_width: page.width,
            page_height: page.height,
        });
    }

    let src_stride = page.row_stride();
    let dst_stride = spec.width as usize * 3;
    let x_start = spec.offset_x as usize * 3;

    let mut pixels = Vec::with_capacity(dst_stride * spec.height as usize);
    for row in page.pixels.chunks_exact(src_stride).take(spec.height as usize) {
        pixels.extend_from_slice(&row[x_start..x_start + dst_stride]);
    }

    Ok(DecodedImage::new(spec.width, spec.height, pixels))
}


// ============================================================================
// Property-Based Tests
// ============================================================================
