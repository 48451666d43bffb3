//! Exact vertical strip partitioning.
//!
//! A page of width `W` is split into `N` full-height bands:
//!
//! ```text
//! base      = floor(W / N)
//! remainder = W - base * N
//! width_i   = base                (i < N - 1)
//! width_N-1 = base + remainder
//! offset_i  = offset_i-1 + width_i-1
//! ```
//!
//! Offsets are a running sum of the preceding widths, so the strips tile
//! `[0, W)` with no gap and no overlap. When `W < N` every strip but the
//! last has zero width; the partition is still exact and callers decide
//! what to do with the empty bands.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Upper bound on strips per page.
pub const MAX_STRIP_COUNT: usize = 10_000;

/// Invalid partition inputs. Fatal for a run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    #[error("strip count must be at least 1")]
    ZeroStripCount,

    #[error("strip count {count} exceeds the maximum of {max}", max = MAX_STRIP_COUNT)]
    TooManyStrips { count: usize },

    #[error("image width must be at least 1 pixel")]
    ZeroWidth,

    #[error("image height must be at least 1 pixel")]
    ZeroHeight,
}

/// Geometry of one vertical strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StripSpec {
    /// Position in the run, `0..N`.
    pub index: usize,
    /// Left edge in source pixels.
    pub offset_x: u32,
    /// Strip width in pixels. May be zero when the page is narrower than `N`.
    pub width: u32,
    /// Strip height; always the full page height.
    pub height: u32,
}

impl StripSpec {
    /// One past the right edge.
    #[inline]
    pub fn end_x(&self) -> u32 {
        self.offset_x + self.width
    }

    /// A zero-width strip has nothing to crop.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Human-readable label for strip `index` of `total`, e.g. `Strip 2 (3%-7%)`
/// for the second of 30.
///
/// Percentages are the nominal share of the page, rounded half up.
pub fn strip_label(index: usize, total: usize) -> String {
    format!(
        "Strip {} ({}%-{}%)",
        index + 1,
        percent_of(index, total),
        percent_of(index + 1, total)
    )
}

fn percent_of(part: usize, total: usize) -> usize {
    if total == 0 {
        return 0;
    }
    (part * 200 + total) / (total * 2)
}

/// Split a `width` x `height` page into `count` exact vertical strips.
///
/// # Errors
///
/// Returns `PartitionError` when `count`, `width` or `height` is zero, or
/// when `count` is above [`MAX_STRIP_COUNT`].
///
/// # Example
///
/// ```ignore
/// let strips = partition_strips(100, 40, 3)?;
/// let widths: Vec<u32> = strips.iter().map(|s| s.width).collect();
/// assert_eq!(widths, [33, 33, 34]);
/// ```
pub fn partition_strips(
    width: u32,
    height: u32,
    count: usize,
) -> Result<Vec<StripSpec>, PartitionError> {
    if count == 0 {
        return Err(PartitionError::ZeroStripCount);
    }
    if count > MAX_STRIP_COUNT {
        return Err(PartitionError::TooManyStrips { count });
    }
    if width == 0 {
        return Err(PartitionError::ZeroWidth);
    }
    if height == 0 {
        return Err(PartitionError::ZeroHeight);
    }

    // u64 so that absurd strip counts cannot truncate.
    let base = (u64::from(width) / count as u64) as u32;
    let remainder = width - (u64::from(base) * count as u64) as u32;

    let mut strips = Vec::with_capacity(count);
    let mut offset_x = 0u32;
    for index in 0..count {
        let strip_width = if index == count - 1 {
            base + remainder
        } else {
            base
        };
        strips.push(StripSpec {
            index,
            offset_x,
            width: strip_width,
            height,
        });
        offset_x += strip_width;
    }

    debug_assert!(is_exact_partition(&strips, width));
    Ok(strips)
}

/// Check that `strips` tile `[0, width)` in index order with no gap or overlap.
pub fn is_exact_partition(strips: &[StripSpec], width: u32) -> bool {
    let mut expected_offset = 0u64;
    for (i, strip) in strips.iter().enumerate() {
        if strip.index != i || u64::from(strip.offset_x) != expected_offset {
            return false;
        }
        expected_offset += u64::from(strip.width);
    }
    expected_offset == u64::from(width)
}


// ============================================================================
// Property-Based Tests
// ============================================================================
