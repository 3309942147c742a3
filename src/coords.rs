//! Tile addressing and coordinate mapping.
//!
//! The coordinate mapper is the pure core of the pipeline: it translates a
//! CATMAID-style tile address (level, row, column, depth) into the level-0
//! sample region the array tier must read. Edge tiles are clipped to the
//! dataset bounds here; the clipped remainder is background-padded by the
//! encoder and never fetched.

use serde::{Deserialize, Serialize};

use crate::dataset::DatasetDescriptor;
use crate::error::AddressError;

// =============================================================================
// TileAddress
// =============================================================================

/// Address of a single tile, as parsed from a request path.
///
/// Follows the CATMAID tile-source-4 convention:
/// `/{dataset}/{level}/{z}/{row}_{col}.{ext}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileAddress {
    /// Dataset identifier
    pub dataset: String,

    /// Pyramid level (0 = full resolution)
    pub level: u32,

    /// Tile column (X, 0-indexed from the left)
    pub col: u64,

    /// Tile row (Y, 0-indexed from the top)
    pub row: u64,

    /// Depth/time index; 0 for 2-D datasets
    pub z: u64,
}

impl TileAddress {
    pub fn new(dataset: impl Into<String>, level: u32, col: u64, row: u64, z: u64) -> Self {
        Self {
            dataset: dataset.into(),
            level,
            col,
            row,
            z,
        }
    }
}

// =============================================================================
// ArrayRegion
// =============================================================================

/// A half-open sample region in level-0 coordinates, plus the resolution
/// level at which it should be read.
///
/// Derived deterministically from a [`TileAddress`]; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayRegion {
    /// Dataset identifier
    pub dataset: String,

    /// Resolution level the samples are read at
    pub level: u32,

    /// Inclusive start per axis: [x, y, z]
    pub start: [u64; 3],

    /// Exclusive end per axis: [x, y, z]
    pub end: [u64; 3],
}

impl ArrayRegion {
    /// Width of the region in level-0 samples.
    pub fn width(&self) -> u64 {
        self.end[0].saturating_sub(self.start[0])
    }

    /// Height of the region in level-0 samples.
    pub fn height(&self) -> u64 {
        self.end[1].saturating_sub(self.start[1])
    }

    /// True when clipping left nothing to fetch on some spatial axis.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Expected sample counts (columns, rows) at the region's level.
    pub fn sample_shape(&self, scale: u64) -> (u64, u64) {
        (self.width().div_ceil(scale), self.height().div_ceil(scale))
    }
}

// =============================================================================
// Coordinate mapping
// =============================================================================

/// Map a tile address to the array region it covers.
///
/// Pure and total over valid addresses. At level L the sample stride is
/// `downsample_factor^L`, so a tile spans `tile_size * stride` level-0
/// samples per spatial axis. The region is clipped to the dataset extent;
/// a tile entirely outside the bounds maps to an empty region rather than
/// an error (the caller serves a background tile without touching the
/// backend).
///
/// # Errors
///
/// `InvalidAddress` when the level exceeds the pyramid depth or the depth
/// index is outside the dataset extent. Unknown dataset ids are rejected
/// earlier, at registry lookup.
pub fn map_tile(
    address: &TileAddress,
    dataset: &DatasetDescriptor,
) -> Result<ArrayRegion, AddressError> {
    let scale = dataset.level_scale(address.level)?;

    if address.z >= dataset.extent[2] {
        return Err(AddressError::DepthOutOfRange {
            z: address.z,
            extent: dataset.extent[2],
        });
    }

    let span_x = dataset.tile_width as u64 * scale;
    let span_y = dataset.tile_height as u64 * scale;

    let origin_x = address.col.saturating_mul(span_x);
    let origin_y = address.row.saturating_mul(span_y);

    // Clip to the dataset bounds; an origin past the edge collapses the
    // axis to an empty range.
    let start_x = origin_x.min(dataset.extent[0]);
    let start_y = origin_y.min(dataset.extent[1]);
    let end_x = origin_x.saturating_add(span_x).min(dataset.extent[0]);
    let end_y = origin_y.saturating_add(span_y).min(dataset.extent[1]);

    Ok(ArrayRegion {
        dataset: dataset.id.clone(),
        level: address.level,
        start: [start_x, start_y, address.z],
        end: [end_x, end_y, address.z + 1],
    })
}

// =============================================================================
// Tests
// =============================================================================
