//! HTTP frontend for the tile API.
//!
//! Exposes the CATMAID tile-source-4 tile endpoint plus dataset metadata
//! and health checks. All tile work is delegated to
//! [`TileService`](crate::tile::TileService); this layer only parses
//! paths, maps errors to HTTP, and sets response headers.

pub mod handlers;
pub mod routes;

pub use handlers::{
    dataset_metadata_handler, datasets_handler, health_handler, tile_handler, AppState,
    DatasetMetadataResponse, DatasetsResponse, ErrorResponse, HealthResponse,
    LevelMetadataResponse, TilePathParams,
};
pub use routes::{create_router, RouterConfig};
