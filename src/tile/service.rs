//! Tile pipeline orchestration.
//!
//! `TileService` wires the pure pieces together into the per-request
//! flow: registry lookup → format check → coordinate mapping → cache key
//! → singleflight cache → (on miss) backend fetch → encode. The service
//! itself holds no per-request state and is cheap to clone into spawned
//! tasks.

use std::sync::Arc;

use tracing::debug;

use crate::array::ArrayFetcher;
use crate::cache::{self, TileCache, TileStore};
use crate::coords::{map_tile, TileAddress};
use crate::dataset::{DatasetDescriptor, DatasetRegistry};
use crate::error::{AddressError, TileError};

use super::{TileEncoder, TileImage};

// =============================================================================
// TileService
// =============================================================================

/// Shared tile pipeline behind the HTTP frontend.
pub struct TileService<F, S>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    registry: Arc<DatasetRegistry>,
    fetcher: Arc<F>,
    cache: Arc<TileCache<S>>,
    encoder: TileEncoder,

    /// Warm neighbouring depth slices after a successful request
    prefetch_adjacent_z: bool,
}

impl<F, S> Clone for TileService<F, S>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            fetcher: Arc::clone(&self.fetcher),
            cache: Arc::clone(&self.cache),
            encoder: self.encoder,
            prefetch_adjacent_z: self.prefetch_adjacent_z,
        }
    }
}

impl<F, S> TileService<F, S>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    pub fn new(
        registry: Arc<DatasetRegistry>,
        fetcher: Arc<F>,
        cache: Arc<TileCache<S>>,
    ) -> Self {
        Self {
            registry,
            fetcher,
            cache,
            encoder: TileEncoder::new(),
            prefetch_adjacent_z: false,
        }
    }

    /// Enable or disable fire-and-forget prefetch of the adjacent depth
    /// slices (z-1, z+1) after each served tile.
    pub fn with_adjacent_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch_adjacent_z = enabled;
        self
    }

    /// Datasets this service can serve.
    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    /// Serve one tile.
    ///
    /// The boolean is true when the tile came from the cache. `ext` is
    /// the extension from the request path and must match the dataset's
    /// configured output format.
    pub async fn get_tile(
        &self,
        address: &TileAddress,
        ext: &str,
    ) -> Result<(TileImage, bool), TileError> {
        let dataset = self.registry.get(&address.dataset)?;
        let result = self.resolve(address, ext, &dataset).await;

        if result.is_ok() && self.prefetch_adjacent_z {
            self.spawn_adjacent_prefetch(address, &dataset);
        }
        result
    }

    /// The pipeline proper, without prefetch side effects.
    async fn resolve(
        &self,
        address: &TileAddress,
        ext: &str,
        dataset: &Arc<DatasetDescriptor>,
    ) -> Result<(TileImage, bool), TileError> {
        if ext != dataset.output.extension() {
            return Err(AddressError::FormatMismatch {
                requested: ext.to_string(),
                configured: dataset.output.extension(),
            }
            .into());
        }

        let region = map_tile(address, dataset)?;
        let key = cache::cache_key(address, dataset);
        let content_type = dataset.output.content_type();
        let encoder = self.encoder;

        if region.is_empty() {
            // Entirely outside the dataset bounds: a background tile,
            // still cached, never a backend round-trip.
            let dataset = Arc::clone(dataset);
            return self
                .cache
                .get_or_generate(&key, content_type, move || async move {
                    Ok(encoder.background_tile(&dataset)?)
                })
                .await;
        }

        let fetcher = Arc::clone(&self.fetcher);
        let dataset = Arc::clone(dataset);
        self.cache
            .get_or_generate(&key, content_type, move || async move {
                let block = fetcher.fetch(&region).await?;
                Ok(encoder.encode(&block, &region, &dataset)?)
            })
            .await
    }

    /// Queue generation of the same tile at z-1 and z+1.
    ///
    /// Prefetch tasks are detached and best-effort: failures are logged
    /// at debug and never affect the request that triggered them. They go
    /// through the same singleflight path as real requests, so a prefetch
    /// and a concurrent request for the same tile share one generation.
    fn spawn_adjacent_prefetch(&self, address: &TileAddress, dataset: &Arc<DatasetDescriptor>) {
        let mut neighbours = Vec::with_capacity(2);
        if address.z > 0 {
            neighbours.push(address.z - 1);
        }
        if address.z + 1 < dataset.extent[2] {
            neighbours.push(address.z + 1);
        }

        for z in neighbours {
            let mut addr = address.clone();
            addr.z = z;
            let key = cache::cache_key(&addr, dataset);
            let ext = dataset.output.extension();
            let dataset = Arc::clone(dataset);
            let service = self.clone();

            tokio::spawn(async move {
                if service.cache.contains(&key).await {
                    return;
                }
                if let Err(e) = service.resolve(&addr, ext, &dataset).await {
                    debug!(key = %key, "adjacent-slice prefetch failed: {}", e);
                }
            });
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
