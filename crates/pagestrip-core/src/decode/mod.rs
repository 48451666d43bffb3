//! Source page decoding.
//!
//! This module provides functionality for:
//! - Decoding a captured page (JPEG or PNG) into an RGB buffer
//! - Reading the EXIF orientation hint left by the capturing device
//!
//! Orientation is only *read* here. Correcting it is the job of
//! [`crate::transform::normalize_orientation`], so a page whose metadata is
//! missing or corrupt still decodes.

mod source;
mod types;

#[cfg(test)]
pub(crate) use source::test_support;
pub use source::{decode_image, load_source, read_orientation};
pub use types::{DecodeError, DecodedImage, Orientation, OrientationReadError, SourceImage};
