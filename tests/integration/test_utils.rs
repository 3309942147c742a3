//! Shared fixtures for integration tests: an in-memory dataset catalog,
//! a deterministic mock array fetcher, and in-memory tile stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use bytes::Bytes;
use tokio::sync::Mutex;

use ndtiler::{
    ArrayFetcher, ArrayRegion, BackendError, CacheError, DatasetDescriptor, DatasetRegistry,
    IntensityRange, RawSampleBlock, RouterConfig, SampleDtype, StorageFormat, TileCache,
    TileFormat, TileService, TileStore,
};

/// PNG dataset: 64x64x4 at level 0, 16px tiles, 3 levels.
pub fn png_dataset() -> DatasetDescriptor {
    DatasetDescriptor {
        id: "cortex".to_string(),
        format: StorageFormat::Precomputed,
        location: "gs://bucket/cortex".to_string(),
        levels: 3,
        extent: [64, 64, 4],
        voxel_resolution: [4.0, 4.0, 40.0],
        tile_width: 16,
        tile_height: 16,
        downsample_factor: 2,
        background: 0,
        intensity: None,
        version: "1".to_string(),
        output: TileFormat::Png,
        jpeg_quality: 80,
    }
}

/// JPEG dataset with a contrast window and non-zero background.
pub fn jpeg_dataset() -> DatasetDescriptor {
    DatasetDescriptor {
        id: "glia".to_string(),
        format: StorageFormat::Zarr,
        location: "s3://bucket/glia".to_string(),
        levels: 2,
        extent: [40, 40, 2],
        voxel_resolution: [8.0, 8.0, 40.0],
        tile_width: 16,
        tile_height: 16,
        downsample_factor: 2,
        background: 32,
        intensity: Some(IntensityRange {
            min: 0.0,
            max: 200.0,
        }),
        version: "1".to_string(),
        output: TileFormat::Jpeg,
        jpeg_quality: 85,
    }
}

pub fn test_registry() -> Arc<DatasetRegistry> {
    Arc::new(DatasetRegistry::new(vec![png_dataset(), jpeg_dataset()]).unwrap())
}

// =============================================================================
// Mock array fetchers
// =============================================================================

/// Deterministic fetcher: every sample is `(start_x + start_y + z) % 251`,
/// so distinct tiles get distinct bytes. Counts fetches.
pub struct MockArrayFetcher {
    pub calls: AtomicUsize,
}

impl MockArrayFetcher {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ArrayFetcher for MockArrayFetcher {
    async fn fetch(&self, region: &ArrayRegion) -> Result<RawSampleBlock, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scale = 2u64.saturating_pow(region.level);
        let (cols, rows) = region.sample_shape(scale);
        let value = ((region.start[0] + region.start[1] + region.start[2]) % 251) as u8;
        Ok(RawSampleBlock::new(
            Bytes::from(vec![value; (rows * cols) as usize]),
            SampleDtype::U8,
            [rows, cols],
        ))
    }
}

/// Fetcher that is permanently down.
pub struct UnavailableArrayFetcher;

#[async_trait]
impl ArrayFetcher for UnavailableArrayFetcher {
    async fn fetch(&self, _region: &ArrayRegion) -> Result<RawSampleBlock, BackendError> {
        Err(BackendError::Unavailable("connection refused".to_string()))
    }
}

// =============================================================================
// Mock tile stores
// =============================================================================

/// In-memory tile store standing in for Redis.
pub struct MemoryTileStore {
    entries: Mutex<HashMap<String, Bytes>>,
}

impl MemoryTileStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl TileStore for MemoryTileStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        self.entries.lock().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().await.contains_key(key))
    }
}

/// Tile store that fails every operation.
pub struct UnavailableTileStore;

#[async_trait]
impl TileStore for UnavailableTileStore {
    async fn get(&self, _key: &str) -> Result<Option<Bytes>, CacheError> {
        Err(CacheError::Unavailable("cache down".to_string()))
    }

    async fn set(&self, _key: &str, _value: Bytes, _ttl: Duration) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("cache down".to_string()))
    }

    async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
        Err(CacheError::Unavailable("cache down".to_string()))
    }
}

// =============================================================================
// Router construction
// =============================================================================

/// Build a frontend router over the given fetcher and store.
pub fn create_test_router<F, S>(fetcher: Arc<F>, store: Arc<S>) -> Router
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    let cache = Arc::new(TileCache::new(store, Duration::ZERO));
    let service = TileService::new(test_registry(), fetcher, cache);
    ndtiler::create_router(service, RouterConfig::new().with_tracing(false))
}

// =============================================================================
// Assertions
// =============================================================================

/// Check the PNG magic bytes.
pub fn is_valid_png(data: &[u8]) -> bool {
    data.len() > 8 && data[..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]
}

/// Check the JPEG SOI marker.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    data.len() > 2 && data[..2] == [0xFF, 0xD8]
}
