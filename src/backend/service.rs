//! Backend tier: bounded array access behind `POST /region`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

use crate::array::{ArrayFetcher, RawSampleBlock, RegionRequest};
use crate::coords::ArrayRegion;
use crate::dataset::DatasetRegistry;
use crate::error::BackendError;
use crate::server::{health_handler, ErrorResponse};

use super::{format_shape, DTYPE_HEADER, SHAPE_HEADER};

// =============================================================================
// ArrayAccessService
// =============================================================================

/// Concurrency-bounded front over an array store fetcher.
///
/// The semaphore decouples backend load from frontend fan-in: at most
/// `permits` region reads run at once, and excess requests queue on the
/// permit rather than failing. Regions are validated against the dataset
/// registry before a permit is taken.
pub struct ArrayAccessService<F: ArrayFetcher> {
    registry: Arc<DatasetRegistry>,
    fetcher: Arc<F>,
    permits: Arc<tokio::sync::Semaphore>,
}

impl<F: ArrayFetcher> ArrayAccessService<F> {
    pub fn new(registry: Arc<DatasetRegistry>, fetcher: Arc<F>, permits: usize) -> Self {
        Self {
            registry,
            fetcher,
            permits: Arc::new(tokio::sync::Semaphore::new(permits)),
        }
    }

    /// Fetch a region through the concurrency bound.
    pub async fn fetch_region(&self, region: &ArrayRegion) -> Result<RawSampleBlock, BackendError> {
        self.validate(region)?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| BackendError::Unavailable("service shutting down".to_string()))?;
        self.fetcher.fetch(region).await
    }

    /// Reject regions that do not fit a known dataset.
    ///
    /// Frontends derive regions from validated addresses, so a violation
    /// here means the two tiers disagree about the dataset catalog.
    fn validate(&self, region: &ArrayRegion) -> Result<(), BackendError> {
        let out_of_range = |message: String| BackendError::RegionOutOfRange {
            dataset: region.dataset.clone(),
            message,
        };

        let dataset = self
            .registry
            .get(&region.dataset)
            .map_err(|_| out_of_range("unknown dataset".to_string()))?;

        if region.level >= dataset.levels {
            return Err(out_of_range(format!(
                "level {} exceeds pyramid depth {}",
                region.level, dataset.levels
            )));
        }
        for axis in 0..3 {
            if region.start[axis] > region.end[axis] {
                return Err(out_of_range(format!(
                    "axis {}: start {} exceeds end {}",
                    axis, region.start[axis], region.end[axis]
                )));
            }
            if region.end[axis] > dataset.extent[axis] {
                return Err(out_of_range(format!(
                    "axis {}: end {} exceeds extent {}",
                    axis, region.end[axis], dataset.extent[axis]
                )));
            }
        }
        Ok(())
    }

    /// Permits currently free.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

// =============================================================================
// Error mapping
// =============================================================================

impl IntoResponse for BackendError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            BackendError::RegionOutOfRange { .. } => {
                (StatusCode::BAD_REQUEST, "region_out_of_range")
            }
            BackendError::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "backend_unavailable"),
            BackendError::Protocol(_) => (StatusCode::BAD_GATEWAY, "backend_protocol"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(error_type, status = status.as_u16(), "Backend error: {}", message);
        } else {
            warn!(error_type, status = status.as_u16(), "Rejected region: {}", message);
        }

        let body = ErrorResponse::with_status(error_type, message, status);
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Router
// =============================================================================

/// Build the backend tier's router.
pub fn backend_router<F: ArrayFetcher + 'static>(service: Arc<ArrayAccessService<F>>) -> Router {
    Router::new()
        .route("/region", post(region_handler::<F>))
        .route("/health", get(health_handler))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}

/// Handle region fetches.
///
/// `200 OK` carries the raw samples as `application/octet-stream` with
/// `x-array-dtype` and `x-array-shape` headers; errors are JSON.
async fn region_handler<F: ArrayFetcher + 'static>(
    State(service): State<Arc<ArrayAccessService<F>>>,
    Json(request): Json<RegionRequest>,
) -> Result<Response, BackendError> {
    let region = ArrayRegion::from(request);
    let block = service.fetch_region(&region).await?;

    debug!(
        dataset = %region.dataset,
        level = region.level,
        bytes = block.data.len(),
        "region served"
    );

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(DTYPE_HEADER, block.dtype.name())
        .header(SHAPE_HEADER, format_shape(block.shape))
        .body(axum::body::Body::from(block.data))
        .unwrap();
    Ok(response)
}

// =============================================================================
// Tests
// =============================================================================
