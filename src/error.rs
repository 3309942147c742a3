use thiserror::Error;

/// Errors produced while resolving a tile address against a dataset.
///
/// These are user-facing: the request named a dataset, level, or coordinate
/// that does not exist. They map to 4xx responses and are never retried.
#[derive(Debug, Clone, Error)]
pub enum AddressError {
    /// The dataset id is not present in the registry
    #[error("unknown dataset: {dataset}")]
    UnknownDataset { dataset: String },

    /// The requested zoom level exceeds the configured pyramid depth
    #[error("level {level} out of range: dataset has {levels} levels (valid range: 0-{})", levels.saturating_sub(1))]
    LevelOutOfRange { level: u32, levels: u32 },

    /// The depth/time index falls outside the dataset extent
    #[error("depth index {z} out of range: dataset extent is [0, {extent})")]
    DepthOutOfRange { z: u64, extent: u64 },

    /// The requested image extension does not match the dataset's output format
    #[error("format '{requested}' not served for this dataset (configured: '{configured}')")]
    FormatMismatch {
        requested: String,
        configured: &'static str,
    },

    /// The tile path could not be parsed into an address
    #[error("malformed tile path: {message}")]
    Malformed { message: String },
}

/// Errors from the array access tier.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// Transient infrastructure fault; callers may retry with backoff
    #[error("array backend unavailable: {0}")]
    Unavailable(String),

    /// The requested region exceeds the dataset bounds.
    ///
    /// Regions are derived from validated addresses, so this indicates an
    /// inconsistency between the coordinate mapper and the dataset
    /// descriptor. Never retried.
    #[error("region out of range for dataset {dataset}: {message}")]
    RegionOutOfRange { dataset: String, message: String },

    /// The backend answered with something the client could not interpret
    #[error("backend protocol error: {0}")]
    Protocol(String),
}

/// Errors from the external key/value tile store.
///
/// Cache faults are always recovered locally: a failed GET degrades to
/// direct generation, a failed SET is logged and the fresh tile is served
/// anyway. This type therefore never surfaces in a tile response.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The store is unreachable or the operation failed
    #[error("cache store unavailable: {0}")]
    Unavailable(String),

    /// The operation exceeded the configured timeout
    #[error("cache operation timed out after {0}ms")]
    Timeout(u64),
}

/// Errors while rendering raw samples into a tile image.
#[derive(Debug, Clone, Error)]
pub enum EncodeError {
    /// The sample block is smaller than its declared shape requires
    #[error("short sample block: expected {expected} bytes, got {actual}")]
    ShortBlock { expected: usize, actual: usize },

    /// The block's shape does not match the clipped region it should cover
    #[error("sample block shape {rows}x{cols} does not match expected {expected_rows}x{expected_cols}")]
    ShapeMismatch {
        rows: u64,
        cols: u64,
        expected_rows: u64,
        expected_cols: u64,
    },

    /// Image codec failure
    #[error("image encoding failed: {0}")]
    Image(String),
}

/// Top-level error for the tile pipeline.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Malformed or out-of-range tile request
    #[error(transparent)]
    InvalidAddress(#[from] AddressError),

    /// Array access tier failure
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Tile rendering failure
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Wraps the leader's failure when broadcast to concurrent waiters of
    /// the same tile key, so one failed generation never turns into a
    /// retry storm.
    #[error("tile generation failed: {0}")]
    Generation(#[source] Box<TileError>),

    /// The generation task ended without producing a result
    #[error("tile generation aborted: {0}")]
    Aborted(String),
}

impl TileError {
    /// Unwrap `Generation` layers down to the originating error.
    pub fn root(&self) -> &TileError {
        match self {
            TileError::Generation(inner) => inner.root(),
            other => other,
        }
    }
}
