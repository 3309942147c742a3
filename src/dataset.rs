//! Dataset descriptors and the process-wide dataset registry.
//!
//! A [`DatasetDescriptor`] captures everything the pipeline needs to know
//! about one logical volume: where it lives, its level-0 extent, the tile
//! grid geometry, and how tiles should be rendered. Descriptors are loaded
//! once at startup from a JSON file and are immutable afterwards; request
//! handling code only ever sees them through `Arc` references held by the
//! [`DatasetRegistry`].
//!
//! # Example dataset file
//!
//! ```json
//! [
//!   {
//!     "id": "cortex",
//!     "format": "precomputed",
//!     "location": "gs://bucket/cortex",
//!     "levels": 5,
//!     "extent": [10000, 8000, 512],
//!     "tile_width": 256,
//!     "tile_height": 256,
//!     "intensity": { "min": 0.0, "max": 255.0 },
//!     "version": "2024-11"
//!   }
//! ]
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 256;

/// Default per-level downsample factor.
pub const DEFAULT_DOWNSAMPLE_FACTOR: u64 = 2;

/// Default JPEG quality for datasets served as JPEG.
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

// =============================================================================
// Storage and output formats
// =============================================================================

/// Storage format of the underlying array store.
///
/// The store itself is an external capability reached through the array
/// access tier; the format is carried so the tier can route the request,
/// not so this crate can parse chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    Precomputed,
    N5,
    Zarr,
}

impl StorageFormat {
    pub fn name(&self) -> &'static str {
        match self {
            StorageFormat::Precomputed => "precomputed",
            StorageFormat::N5 => "n5",
            StorageFormat::Zarr => "zarr",
        }
    }
}

/// Output image format for encoded tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileFormat {
    Png,
    Jpeg,
}

impl TileFormat {
    /// File extension used in tile paths (no leading dot).
    pub fn extension(&self) -> &'static str {
        match self {
            TileFormat::Png => "png",
            TileFormat::Jpeg => "jpg",
        }
    }

    /// MIME type for HTTP responses.
    pub fn content_type(&self) -> &'static str {
        match self {
            TileFormat::Png => "image/png",
            TileFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Contrast/normalization window applied when rendering samples to pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntensityRange {
    pub min: f64,
    pub max: f64,
}

// =============================================================================
// DatasetDescriptor
// =============================================================================

/// Immutable description of one logical dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Dataset identifier used in tile paths and cache keys
    pub id: String,

    /// Storage format of the backing array store
    pub format: StorageFormat,

    /// Location URI of the array store (e.g. "gs://bucket/vol")
    pub location: String,

    /// Number of pyramid levels; level 0 is full resolution
    pub levels: u32,

    /// Level-0 extent per axis: [x, y, z] in samples
    pub extent: [u64; 3],

    /// Level-0 voxel resolution per axis (nm or dataset units)
    #[serde(default = "default_resolution")]
    pub voxel_resolution: [f64; 3],

    /// Tile width in pixels
    #[serde(default = "default_tile_size")]
    pub tile_width: u32,

    /// Tile height in pixels
    #[serde(default = "default_tile_size")]
    pub tile_height: u32,

    /// Per-level downsample factor for the spatial axes
    #[serde(default = "default_downsample_factor")]
    pub downsample_factor: u64,

    /// Output pixel value used to pad regions outside the dataset bounds
    #[serde(default)]
    pub background: u8,

    /// Optional contrast window; defaults to the full dtype range
    #[serde(default)]
    pub intensity: Option<IntensityRange>,

    /// Version tag included in cache keys.
    ///
    /// Bumping this after a dataset update makes all previously cached
    /// tiles unreachable, so no active invalidation is needed.
    #[serde(default = "default_version")]
    pub version: String,

    /// Output image format for tiles
    #[serde(default = "default_tile_format")]
    pub output: TileFormat,

    /// JPEG quality, used when `output` is jpeg
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_resolution() -> [f64; 3] {
    [1.0, 1.0, 1.0]
}

fn default_tile_size() -> u32 {
    DEFAULT_TILE_SIZE
}

fn default_downsample_factor() -> u64 {
    DEFAULT_DOWNSAMPLE_FACTOR
}

fn default_version() -> String {
    "1".to_string()
}

fn default_tile_format() -> TileFormat {
    TileFormat::Png
}

fn default_jpeg_quality() -> u8 {
    DEFAULT_JPEG_QUALITY
}

impl DatasetDescriptor {
    /// Sample stride at the given level (downsample_factor ^ level).
    ///
    /// Returns an error when the level exceeds the pyramid depth.
    pub fn level_scale(&self, level: u32) -> Result<u64, AddressError> {
        if level >= self.levels {
            return Err(AddressError::LevelOutOfRange {
                level,
                levels: self.levels,
            });
        }
        // Pyramid depths are small; overflow would require factor^level to
        // exceed u64, which validate() rules out.
        Ok(self.downsample_factor.pow(level))
    }

    /// Spatial extent (x, y) at the given level, in samples.
    pub fn level_extent(&self, level: u32) -> Result<(u64, u64), AddressError> {
        let scale = self.level_scale(level)?;
        Ok((self.extent[0].div_ceil(scale), self.extent[1].div_ceil(scale)))
    }

    /// Number of tile columns and rows covering the given level.
    pub fn tile_grid(&self, level: u32) -> Result<(u64, u64), AddressError> {
        let (w, h) = self.level_extent(level)?;
        Ok((
            w.div_ceil(self.tile_width as u64),
            h.div_ceil(self.tile_height as u64),
        ))
    }

    /// Validate the descriptor after load.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.is_empty() {
            return Err("dataset id must not be empty".to_string());
        }
        // Cache keys are colon-delimited and tile paths are slash-delimited
        if self.id.contains(':') || self.id.contains('/') {
            return Err(format!("dataset id '{}' must not contain ':' or '/'", self.id));
        }
        if self.levels == 0 {
            return Err(format!("dataset '{}': levels must be >= 1", self.id));
        }
        if self.tile_width == 0 || self.tile_height == 0 {
            return Err(format!("dataset '{}': tile dimensions must be > 0", self.id));
        }
        if self.downsample_factor < 2 {
            return Err(format!(
                "dataset '{}': downsample_factor must be >= 2",
                self.id
            ));
        }
        if self.extent.iter().any(|&e| e == 0) {
            return Err(format!("dataset '{}': extent axes must be > 0", self.id));
        }
        if self
            .downsample_factor
            .checked_pow(self.levels.saturating_sub(1))
            .is_none()
        {
            return Err(format!(
                "dataset '{}': downsample_factor^levels overflows",
                self.id
            ));
        }
        if let Some(range) = &self.intensity {
            if range.max <= range.min {
                return Err(format!(
                    "dataset '{}': intensity max must exceed min",
                    self.id
                ));
            }
        }
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(format!(
                "dataset '{}': jpeg_quality must be between 1 and 100",
                self.id
            ));
        }
        Ok(())
    }
}

// =============================================================================
// DatasetRegistry
// =============================================================================

/// Read-only lookup table of dataset descriptors, built once at startup.
#[derive(Debug, Default)]
pub struct DatasetRegistry {
    datasets: HashMap<String, Arc<DatasetDescriptor>>,
}

impl DatasetRegistry {
    /// Build a registry from a list of descriptors, validating each one.
    pub fn new(descriptors: Vec<DatasetDescriptor>) -> Result<Self, String> {
        let mut datasets = HashMap::with_capacity(descriptors.len());
        for descriptor in descriptors {
            descriptor.validate()?;
            let id = descriptor.id.clone();
            if datasets.insert(id.clone(), Arc::new(descriptor)).is_some() {
                return Err(format!("duplicate dataset id '{}'", id));
            }
        }
        Ok(Self { datasets })
    }

    /// Load descriptors from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
        let descriptors: Vec<DatasetDescriptor> = serde_json::from_str(&raw)
            .map_err(|e| format!("failed to parse {}: {}", path.display(), e))?;
        Self::new(descriptors)
    }

    /// Look up a dataset, failing with `InvalidAddress` for unknown ids.
    pub fn get(&self, id: &str) -> Result<Arc<DatasetDescriptor>, AddressError> {
        self.datasets
            .get(id)
            .cloned()
            .ok_or_else(|| AddressError::UnknownDataset {
                dataset: id.to_string(),
            })
    }

    /// All registered dataset ids, sorted for stable listings.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.datasets.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

// =============================================================================
// Tests
// =============================================================================
