//! Orientation normalization for captured pages.
//!
//! The capturing device stores the page in sensor order and records the turn
//! needed to display it upright. Before partitioning, the page is rotated
//! losslessly (pure pixel transposition, no resampling) so that strips are
//! cut along the page's real vertical axis.
//!
//! This step never fails: a missing tag, an unknown tag, or a buffer that
//! cannot be rotated all yield the original pixels unchanged.

use image::imageops;

use crate::decode::{DecodedImage, Orientation, SourceImage};

/// An upright page ready for partitioning.
#[derive(Debug, Clone)]
pub struct UprightImage {
    /// Upright pixels.
    pub image: DecodedImage,
    /// Clockwise degrees that were actually applied (0, 90, 180 or 270).
    pub applied_degrees: u32,
}

impl UprightImage {
    pub fn width(&self) -> u32 {
        self.image.width
    }

    pub fn height(&self) -> u32 {
        self.image.height
    }
}

/// Rotate a source page to upright display orientation.
///
/// # Example
///
/// ```ignore
/// // A 600x800 page tagged rotate90 comes out 800x600.
/// let upright = normalize_orientation(source);
/// assert_eq!((upright.width(), upright.height()), (800, 600));
/// ```
pub fn normalize_orientation(source: SourceImage) -> UprightImage {
    let (image, orientation) = source.into_parts();
    let orientation = orientation.unwrap_or_default();

    if orientation.degrees() == 0 {
        return UprightImage {
            image,
            applied_degrees: 0,
        };
    }

    match rotate_upright(&image, orientation) {
        Some(rotated) => {
            tracing::debug!(
                degrees = orientation.degrees(),
                from = ?image.dimensions(),
                to = ?rotated.dimensions(),
                "rotated page upright"
            );
            UprightImage {
                image: rotated,
                applied_degrees: orientation.degrees(),
            }
        }
        None => {
            tracing::warn!(
                ?orientation,
                "page buffer does not match its dimensions, keeping original orientation"
            );
            UprightImage {
                image,
                applied_degrees: 0,
            }
        }
    }
}

/// Apply the clockwise turn described by `orientation`.
///
/// Returns `None` if the pixel buffer is inconsistent with the dimensions.
fn rotate_upright(image: &DecodedImage, orientation: Orientation) -> Option<DecodedImage> {
    let view = image.as_rgb_image()?;
    let rotated = match orientation {
        Orientation::Rotate90 => imageops::rotate90(&view),
        Orientation::Rotate180 => imageops::rotate180(&view),
        Orientation::Rotate270 => imageops::rotate270(&view),
        Orientation::Normal | Orientation::Unknown => return Some(image.clone()),
    };
    Some(DecodedImage::from_rgb_image(rotated))
}
