//! Source page decoding with best-effort EXIF orientation lookup.

use std::io::Cursor;

use exif::{In, Reader, Tag};
use image::ImageReader;

use super::{DecodeError, DecodedImage, Orientation, OrientationReadError, SourceImage};

/// Decode an encoded page image (JPEG or PNG) into RGB pixels.
///
/// Orientation metadata is not applied here; see
/// [`crate::transform::normalize_orientation`].
///
/// # Errors
///
/// Returns `DecodeError::CorruptedFile` if the bytes cannot be decoded and
/// `DecodeError::InvalidDimensions` if the result has a zero-length edge.
pub fn decode_image(bytes: &[u8]) -> Result<DecodedImage, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::InvalidFormat);
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    if reader.format().is_none() {
        return Err(DecodeError::InvalidFormat);
    }

    let img = reader
        .decode()
        .map_err(|e| DecodeError::CorruptedFile(e.to_string()))?;

    let rgb = img.into_rgb8();
    let (width, height) = rgb.dimensions();
    if width == 0 || height == 0 {
        return Err(DecodeError::InvalidDimensions { width, height });
    }

    Ok(DecodedImage::from_rgb_image(rgb))
}

/// Read the EXIF orientation tag from an encoded image.
pub fn read_orientation(bytes: &[u8]) -> Result<Orientation, OrientationReadError> {
    let mut cursor = Cursor::new(bytes);
    let exif = Reader::new()
        .read_from_container(&mut cursor)
        .map_err(|e| match e {
            exif::Error::NotFound(_) => OrientationReadError::Missing,
            other => OrientationReadError::Corrupt(other.to_string()),
        })?;

    exif.get_field(Tag::Orientation, In::PRIMARY)
        .and_then(|field| field.value.get_uint(0))
        .map(Orientation::from)
        .ok_or(OrientationReadError::NoOrientationField)
}

/// Decode a captured page and attach whatever orientation hint it carries.
///
/// A missing or corrupt EXIF block is not an error: the returned
/// `SourceImage` simply has no orientation.
pub fn load_source(bytes: &[u8]) -> Result<SourceImage, DecodeError> {
    let image = decode_image(bytes)?;

    let orientation = match read_orientation(bytes) {
        Ok(orientation) => Some(orientation),
        Err(err) => {
            tracing::debug!("orientation unavailable, treating page as upright: {err}");
            None
        }
    };

    Ok(SourceImage::new(image, orientation))
}
