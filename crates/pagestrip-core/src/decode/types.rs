//! Core types for source image loading.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error types for source image decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The bytes are not in a recognized image format.
    #[error("Invalid or unsupported image format")]
    InvalidFormat,

    /// The image file is corrupted or incomplete.
    #[error("Corrupted or incomplete image file: {0}")]
    CorruptedFile(String),

    /// The image decoded to an unusable size.
    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}

/// Orientation metadata could not be read from the source bytes.
///
/// This never aborts a run; the normalizer falls back to the unrotated image.
#[derive(Debug, Error)]
pub enum OrientationReadError {
    /// The container has no EXIF block at all.
    #[error("No EXIF metadata present")]
    Missing,

    /// An EXIF block exists but could not be parsed.
    #[error("EXIF metadata is corrupt: {0}")]
    Corrupt(String),

    /// EXIF parsed fine but carries no orientation field.
    #[error("EXIF metadata has no orientation field")]
    NoOrientationField,
}

/// Rotation hint embedded by the capturing device.
///
/// Only the four pure rotations are meaningful for scanned pages. Mirrored
/// EXIF codes and out-of-range values map to [`Orientation::Unknown`], which
/// the normalizer treats like `Normal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Already upright.
    #[default]
    Normal,
    /// Needs a 90 degree clockwise turn to display upright.
    Rotate90,
    /// Needs a half turn.
    Rotate180,
    /// Needs a 270 degree clockwise (90 counter-clockwise) turn.
    Rotate270,
    /// Tag present but not one of the pure rotations.
    Unknown,
}

impl Orientation {
    /// Clockwise rotation in degrees required to make the image upright.
    pub fn degrees(self) -> u32 {
        match self {
            Orientation::Normal | Orientation::Unknown => 0,
            Orientation::Rotate90 => 90,
            Orientation::Rotate180 => 180,
            Orientation::Rotate270 => 270,
        }
    }

    /// Returns true if correcting this orientation swaps width and height.
    #[inline]
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Orientation::Rotate90 | Orientation::Rotate270)
    }
}

impl From<u32> for Orientation {
    /// Map a raw EXIF orientation code (1-8).
    fn from(value: u32) -> Self {
        match value {
            1 => Orientation::Normal,
            3 => Orientation::Rotate180,
            6 => Orientation::Rotate90,
            8 => Orientation::Rotate270,
            _ => Orientation::Unknown,
        }
    }
}

/// A decoded image with RGB pixel data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// RGB pixel data in row-major order (3 bytes per pixel).
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Create a new DecodedImage with the given dimensions and pixel data.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(
            pixels.len(),
            width as usize * height as usize * 3,
            "Pixel buffer size mismatch"
        );
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Create a DecodedImage from an image::RgbImage.
    pub fn from_rgb_image(img: image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            pixels: img.into_raw(),
        }
    }

    /// Borrow the pixels as an image::RgbImage view for imageops.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn as_rgb_image(&self) -> Option<image::ImageBuffer<image::Rgb<u8>, &[u8]>> {
        image::ImageBuffer::from_raw(self.width, self.height, self.pixels.as_slice())
    }

    /// Number of bytes in one pixel row.
    #[inline]
    pub fn row_stride(&self) -> usize {
        self.width as usize * 3
    }

    /// Pixel dimensions as `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// One captured page: pixels plus the best-effort orientation hint.
///
/// `orientation` is `None` when the metadata was absent or unreadable.
#[derive(Debug, Clone)]
pub struct SourceImage {
    image: DecodedImage,
    orientation: Option<Orientation>,
}

impl SourceImage {
    pub fn new(image: DecodedImage, orientation: Option<Orientation>) -> Self {
        Self { image, orientation }
    }

    pub fn width(&self) -> u32 {
        self.image.width
    }

    pub fn height(&self) -> u32 {
        self.image.height
    }

    pub fn orientation(&self) -> Option<Orientation> {
        self.orientation
    }

    /// Split into the pixel buffer and orientation hint.
    pub fn into_parts(self) -> (DecodedImage, Option<Orientation>) {
        (self.image, self.orientation)
    }
}
