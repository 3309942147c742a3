//! Tile caching: cache keys, external store clients, and singleflight
//! coordination.

mod store;
mod tile_cache;

pub use store::{RedisTileStore, TileStore, DEFAULT_CACHE_OP_TIMEOUT};
pub use tile_cache::TileCache;

use crate::coords::TileAddress;
use crate::dataset::DatasetDescriptor;

/// Build the cache key for a tile address.
///
/// Deterministic: field-equal addresses always map to the same key, and
/// the `:` delimiter (banned from dataset ids) keeps distinct addresses
/// from colliding. The dataset's version tag is part of the key, so
/// bumping the version invalidates every cached tile of that dataset
/// without touching the store.
pub fn cache_key(address: &TileAddress, dataset: &DatasetDescriptor) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}:{}",
        address.dataset,
        dataset.version,
        address.level,
        address.z,
        address.row,
        address.col,
        dataset.output.extension(),
    )
}
