//! # ndtiler
//!
//! A CATMAID-style tile server for N-dimensional array datasets.
//!
//! Tiles are cut on demand from large array volumes (precomputed, N5,
//! Zarr) held in an external array store, rendered to PNG or JPEG, and
//! cached in an external Redis-compatible key/value store. Generation is
//! expensive, so the pipeline is built around not doing it twice: a
//! cache-aside protocol against the external store, per-key singleflight
//! within each process, and a two-tier split that bounds concurrent array
//! reads behind a semaphore.
//!
//! ## Features
//!
//! - **Tile-source-4 addressing**: `/tiles/{dataset}/{level}/{z}/{y}_{x}.{ext}`
//! - **Singleflight generation**: concurrent requests for one tile share a
//!   single fetch-and-encode; failures are broadcast, nobody hangs
//! - **Cache degradation**: an unreachable cache store never fails a
//!   request, it only costs the cache benefit
//! - **Bounded backend**: the array tier queues excess reads on a
//!   semaphore instead of failing them
//!
//! ## Architecture
//!
//! - [`coords`] - Tile addresses and the pure tile-to-region mapper
//! - [`dataset`] - Dataset descriptors and the startup registry
//! - [`array`] - Raw sample blocks and the array access contract
//! - [`cache`] - Cache keys, Redis store client, singleflight tile cache
//! - [`tile`] - Encoder and the request pipeline
//! - [`backend`] - Array access tier: bounded service and HTTP client
//! - [`server`] - Axum frontend: routes, handlers, error mapping
//! - [`config`] - CLI and configuration types

pub mod array;
pub mod backend;
pub mod cache;
pub mod config;
pub mod coords;
pub mod dataset;
pub mod error;
pub mod server;
pub mod tile;

// Re-export commonly used types
pub use array::{ArrayFetcher, RawSampleBlock, RegionRequest, SampleDtype};
pub use backend::{backend_router, ArrayAccessService, RemoteArrayClient};
pub use cache::{cache_key, RedisTileStore, TileCache, TileStore};
pub use config::{BackendConfig, Cli, Command, ServeConfig};
pub use coords::{map_tile, ArrayRegion, TileAddress};
pub use dataset::{DatasetDescriptor, DatasetRegistry, IntensityRange, StorageFormat, TileFormat};
pub use error::{AddressError, BackendError, CacheError, EncodeError, TileError};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use tile::{TileEncoder, TileImage, TileService};
