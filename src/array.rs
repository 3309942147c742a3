//! Raw sample blocks and the array access contract.
//!
//! The array store itself (precomputed/N5/Zarr internals) is an external
//! capability. This module defines the seam: a region request goes in, a
//! row-major block of raw samples comes out. Both the frontend's remote
//! client and the backend tier's store client implement [`ArrayFetcher`].

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::coords::ArrayRegion;
use crate::error::BackendError;

// =============================================================================
// Sample dtype
// =============================================================================

/// Element type of the raw samples returned by the array tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleDtype {
    U8,
    U16,
}

impl SampleDtype {
    /// Bytes per sample.
    pub fn size(&self) -> usize {
        match self {
            SampleDtype::U8 => 1,
            SampleDtype::U16 => 2,
        }
    }

    /// Wire name used in the `x-array-dtype` header.
    pub fn name(&self) -> &'static str {
        match self {
            SampleDtype::U8 => "u8",
            SampleDtype::U16 => "u16",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "u8" => Some(SampleDtype::U8),
            "u16" => Some(SampleDtype::U16),
            _ => None,
        }
    }

    /// Upper bound of the dtype's value range, as f64.
    pub fn max_value(&self) -> f64 {
        match self {
            SampleDtype::U8 => u8::MAX as f64,
            SampleDtype::U16 => u16::MAX as f64,
        }
    }
}

// =============================================================================
// RawSampleBlock
// =============================================================================

/// A row-major 2-D block of raw samples for one depth slice.
///
/// `shape` is `[rows, cols]` in level-resolution samples; `data` holds
/// `rows * cols` samples in little-endian row-major order (the backend
/// wire format, independent of host endianness).
#[derive(Debug, Clone)]
pub struct RawSampleBlock {
    pub data: Bytes,
    pub dtype: SampleDtype,
    pub shape: [u64; 2],
}

impl RawSampleBlock {
    pub fn new(data: Bytes, dtype: SampleDtype, shape: [u64; 2]) -> Self {
        Self { data, dtype, shape }
    }

    pub fn rows(&self) -> u64 {
        self.shape[0]
    }

    pub fn cols(&self) -> u64 {
        self.shape[1]
    }

    /// Byte length the declared shape requires.
    pub fn expected_len(&self) -> usize {
        (self.shape[0] as usize) * (self.shape[1] as usize) * self.dtype.size()
    }
}

// =============================================================================
// Wire request
// =============================================================================

/// JSON body of a backend region fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionRequest {
    pub dataset: String,
    pub level: u32,
    pub start: [u64; 3],
    pub end: [u64; 3],
}

impl From<&ArrayRegion> for RegionRequest {
    fn from(region: &ArrayRegion) -> Self {
        Self {
            dataset: region.dataset.clone(),
            level: region.level,
            start: region.start,
            end: region.end,
        }
    }
}

impl From<RegionRequest> for ArrayRegion {
    fn from(request: RegionRequest) -> Self {
        ArrayRegion {
            dataset: request.dataset,
            level: request.level,
            start: request.start,
            end: request.end,
        }
    }
}

// =============================================================================
// ArrayFetcher trait
// =============================================================================

/// Capability for reading a sample region out of an array store.
///
/// Implementations must treat equal regions as interchangeable: the tile
/// pipeline relies on fetches being deterministic for a given (dataset
/// version, region) so that duplicate cross-process generation is benign.
#[async_trait]
pub trait ArrayFetcher: Send + Sync {
    /// Fetch the raw samples covering `region`.
    ///
    /// # Errors
    ///
    /// - `BackendError::Unavailable` for transient faults (retryable)
    /// - `BackendError::RegionOutOfRange` when the region exceeds the
    ///   dataset bounds (a mapper defect; never retried)
    async fn fetch(&self, region: &ArrayRegion) -> Result<RawSampleBlock, BackendError>;
}

// =============================================================================
// Tests
// =============================================================================
