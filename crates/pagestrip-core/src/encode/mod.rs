//! Strip encoding.
//!
//! Cropped strips are encoded to JPEG before they are written to scratch
//! storage and uploaded. All operations are synchronous and run on the
//! upload worker that owns the strip.

mod jpeg;

pub use jpeg::{encode_jpeg, EncodeError};
