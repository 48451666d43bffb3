//! Page transforms applied before upload: orientation, then strip cropping.
//!
//! # Transform Order
//!
//! 1. Orientation normalization (whole page, lossless quarter turns)
//! 2. Partitioning (see [`crate::partition`])
//! 3. Strip cropping (one crop per strip, inside the upload workers)
//!
//! # Coordinate System
//!
//! - Crop coordinates are integer pixels on the upright page
//! - Origin is the top-left corner

mod crop;
mod orientation;

pub use crop::{crop_strip, CropError};
pub use orientation::{normalize_orientation, UprightImage};
