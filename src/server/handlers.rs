//! HTTP request handlers for the tile API.
//!
//! # Endpoints
//!
//! - `GET /tiles/{dataset}/{level}/{z}/{y}_{x}.{ext}` - Serve a tile
//! - `GET /datasets` - List dataset ids
//! - `GET /datasets/{dataset}` - Dataset metadata
//! - `GET /health` - Health check

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::array::ArrayFetcher;
use crate::cache::TileStore;
use crate::dataset::DatasetDescriptor;
use crate::error::{AddressError, BackendError, TileError};
use crate::tile::TileService;

// =============================================================================
// Application State
// =============================================================================

/// Shared state passed to all handlers via axum's State extractor.
pub struct AppState<F, S>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    /// The tile pipeline
    pub tile_service: Arc<TileService<F, S>>,

    /// Cache-Control max-age in seconds for tile responses
    pub cache_max_age: u32,
}

impl<F, S> AppState<F, S>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    pub fn new(tile_service: TileService<F, S>, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

impl<F, S> Clone for AppState<F, S>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from `/tiles/{dataset}/{level}/{z}/{filename}` where the
/// filename is `{y}_{x}.{ext}` per the CATMAID tile-source-4 convention.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    /// Dataset identifier
    pub dataset: String,

    /// Pyramid level (0 = full resolution)
    pub level: u32,

    /// Depth/time index
    pub z: u64,

    /// `{row}_{col}.{ext}` filename component
    pub filename: String,
}

impl TilePathParams {
    /// Parse the filename into a tile address and requested extension.
    pub fn address(&self) -> Result<(crate::coords::TileAddress, String), AddressError> {
        let malformed = |message: &str| AddressError::Malformed {
            message: message.to_string(),
        };

        let (stem, ext) = self
            .filename
            .rsplit_once('.')
            .ok_or_else(|| malformed("missing image extension"))?;
        if ext.is_empty() {
            return Err(malformed("empty image extension"));
        }
        let (row, col) = stem
            .split_once('_')
            .ok_or_else(|| malformed("expected {row}_{col}.{ext}"))?;
        let row: u64 = row
            .parse()
            .map_err(|_| malformed("row is not a non-negative integer"))?;
        let col: u64 = col
            .parse()
            .map_err(|_| malformed("column is not a non-negative integer"))?;

        Ok((
            crate::coords::TileAddress::new(&self.dataset, self.level, col, row, self.z),
            ext.to_string(),
        ))
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions, on both tiers.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g. "not_found", "backend_unavailable")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the dataset list endpoint.
#[derive(Debug, Serialize)]
pub struct DatasetsResponse {
    pub datasets: Vec<String>,
}

/// Per-level geometry in the metadata response.
#[derive(Debug, Serialize)]
pub struct LevelMetadataResponse {
    /// Pyramid level index (0 = full resolution)
    pub level: u32,

    /// Level extent in samples
    pub width: u64,
    pub height: u64,

    /// Sample stride relative to level 0
    pub scale: u64,

    /// Tile grid covering this level
    pub tiles_x: u64,
    pub tiles_y: u64,
}

/// Response from the dataset metadata endpoint.
#[derive(Debug, Serialize)]
pub struct DatasetMetadataResponse {
    pub id: String,
    pub format: String,
    pub extent: [u64; 3],
    pub voxel_resolution: [f64; 3],
    pub tile_width: u32,
    pub tile_height: u32,
    pub level_count: u32,
    pub output: String,
    pub levels: Vec<LevelMetadataResponse>,
}

impl DatasetMetadataResponse {
    fn from_descriptor(dataset: &DatasetDescriptor) -> Self {
        let mut levels = Vec::with_capacity(dataset.levels as usize);
        for level in 0..dataset.levels {
            // Levels below the configured count always have a valid scale
            if let (Ok(scale), Ok((width, height)), Ok((tiles_x, tiles_y))) = (
                dataset.level_scale(level),
                dataset.level_extent(level),
                dataset.tile_grid(level),
            ) {
                levels.push(LevelMetadataResponse {
                    level,
                    width,
                    height,
                    scale,
                    tiles_x,
                    tiles_y,
                });
            }
        }
        Self {
            id: dataset.id.clone(),
            format: dataset.format.name().to_string(),
            extent: dataset.extent,
            voxel_resolution: dataset.voxel_resolution,
            tile_width: dataset.tile_width,
            tile_height: dataset.tile_height,
            level_count: dataset.levels,
            output: dataset.output.extension().to_string(),
            levels,
        }
    }
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to an HTTP response.
///
/// 4xx errors are logged at WARN (404s at DEBUG, they are routine), 5xx
/// at ERROR. `Generation` wrappers are unwrapped first so waiters report
/// the same status as the leader.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let root = self.root();
        let (status, error_type) = match root {
            TileError::InvalidAddress(addr) => match addr {
                AddressError::UnknownDataset { .. } => (StatusCode::NOT_FOUND, "not_found"),
                AddressError::LevelOutOfRange { .. } => {
                    (StatusCode::BAD_REQUEST, "level_out_of_range")
                }
                AddressError::DepthOutOfRange { .. } => {
                    (StatusCode::BAD_REQUEST, "depth_out_of_range")
                }
                AddressError::FormatMismatch { .. } => {
                    (StatusCode::BAD_REQUEST, "format_mismatch")
                }
                AddressError::Malformed { .. } => (StatusCode::BAD_REQUEST, "malformed_path"),
            },

            TileError::Backend(backend) => match backend {
                // Already retried by the client; the backend stayed down
                BackendError::Unavailable(_) => (StatusCode::BAD_GATEWAY, "backend_unavailable"),
                // Mapper and backend disagree about the dataset catalog
                BackendError::RegionOutOfRange { .. } => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "internal_inconsistency")
                }
                BackendError::Protocol(_) => (StatusCode::BAD_GATEWAY, "backend_protocol"),
            },

            TileError::Encode(_) => (StatusCode::INTERNAL_SERVER_ERROR, "encode_error"),
            TileError::Aborted(_) => (StatusCode::INTERNAL_SERVER_ERROR, "generation_aborted"),
            // root() never returns a Generation wrapper
            TileError::Generation(_) => (StatusCode::INTERNAL_SERVER_ERROR, "generation_failed"),
        };
        let message = root.to_string();

        if status.is_server_error() {
            error!(error_type, status = status.as_u16(), "Server error: {}", message);
        } else if status == StatusCode::NOT_FOUND {
            debug!(error_type, status = status.as_u16(), "Not found: {}", message);
        } else {
            warn!(error_type, status = status.as_u16(), "Client error: {}", message);
        }

        let body = ErrorResponse::with_status(error_type, message, status);
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Response
///
/// - `200 OK`: encoded tile with the dataset's content type
/// - `400 Bad Request`: malformed path, bad level/depth, format mismatch
/// - `404 Not Found`: unknown dataset
/// - `502 Bad Gateway`: array backend unreachable after retries
///
/// # Headers
///
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
pub async fn tile_handler<F, S>(
    State(state): State<AppState<F, S>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, TileError>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    let (address, ext) = params.address().map_err(TileError::InvalidAddress)?;
    let (tile, cache_hit) = state.tile_service.get_tile(&address, &ext).await?;

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, tile.content_type)
        .header(
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        )
        .header("X-Tile-Cache-Hit", cache_hit.to_string())
        .body(axum::body::Body::from(tile.data))
        .unwrap();
    Ok(response)
}

/// Handle health check requests.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle dataset list requests.
pub async fn datasets_handler<F, S>(State(state): State<AppState<F, S>>) -> Json<DatasetsResponse>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    Json(DatasetsResponse {
        datasets: state.tile_service.registry().ids(),
    })
}

/// Handle dataset metadata requests.
pub async fn dataset_metadata_handler<F, S>(
    State(state): State<AppState<F, S>>,
    Path(dataset): Path<String>,
) -> Result<Json<DatasetMetadataResponse>, TileError>
where
    F: ArrayFetcher + 'static,
    S: TileStore + 'static,
{
    let descriptor = state.tile_service.registry().get(&dataset)?;
    Ok(Json(DatasetMetadataResponse::from_descriptor(&descriptor)))
}

// =============================================================================
// Tests
// =============================================================================
