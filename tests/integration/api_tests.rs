//! API integration tests for the tile frontend.
//!
//! Tests verify:
//! - Tile retrieval and response headers for PNG and JPEG datasets
//! - Error cases (unknown dataset, bad coordinates, malformed paths)
//! - Dataset metadata endpoints
//! - Cache degradation when the tile store is down

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use super::test_utils::{
    create_test_router, is_valid_jpeg, is_valid_png, MemoryTileStore, MockArrayFetcher,
    UnavailableArrayFetcher, UnavailableTileStore,
};

async fn get(router: axum::Router, uri: &str) -> axum::http::Response<axum::body::Body> {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    router.oneshot(request).await.unwrap()
}

async fn json_body(response: axum::http::Response<axum::body::Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_png_tile_retrieval() {
    let fetcher = Arc::new(MockArrayFetcher::new());
    let store = Arc::new(MemoryTileStore::new());
    let router = create_test_router(fetcher.clone(), store);

    let response = get(router, "/tiles/cortex/0/0/1_2.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert!(response.headers().contains_key("cache-control"));
    assert_eq!(response.headers()["x-tile-cache-hit"], "false");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_valid_png(&body));
    assert_eq!(fetcher.call_count(), 1);

    // Decoded tile has the dataset's configured dimensions
    let decoded = image::load_from_memory(&body).unwrap().to_luma8();
    assert_eq!(decoded.dimensions(), (16, 16));
}

#[tokio::test]
async fn test_second_request_is_a_cache_hit() {
    let fetcher = Arc::new(MockArrayFetcher::new());
    let store = Arc::new(MemoryTileStore::new());
    let router = create_test_router(fetcher.clone(), store.clone());

    let first = get(router.clone(), "/tiles/cortex/0/0/0_0.png").await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_body = first.into_body().collect().await.unwrap().to_bytes();

    let second = get(router, "/tiles/cortex/0/0/0_0.png").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-tile-cache-hit"], "true");
    let second_body = second.into_body().collect().await.unwrap().to_bytes();

    assert_eq!(first_body, second_body);
    assert_eq!(fetcher.call_count(), 1);
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_jpeg_dataset_serves_jpeg() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/tiles/glia/0/0/0_0.jpg").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "image/jpeg");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_valid_jpeg(&body));
}

#[tokio::test]
async fn test_out_of_bounds_tile_is_background_without_fetch() {
    let fetcher = Arc::new(MockArrayFetcher::new());
    let router = create_test_router(fetcher.clone(), Arc::new(MemoryTileStore::new()));

    // Column 100 at level 0 starts far past extent 64
    let response = get(router, "/tiles/cortex/0/0/0_100.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fetcher.call_count(), 0);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let decoded = image::load_from_memory(&body).unwrap().to_luma8();
    assert!(decoded.pixels().all(|p| p.0[0] == 0));
}

// =============================================================================
// Error Cases
// =============================================================================

#[tokio::test]
async fn test_unknown_dataset_returns_404() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/tiles/missing/0/0/0_0.png").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(response).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_level_out_of_range_returns_400() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/tiles/cortex/9/0/0_0.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "level_out_of_range");
}

#[tokio::test]
async fn test_depth_out_of_range_returns_400() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    // Extent has 4 depth slices, z=4 is past the end
    let response = get(router, "/tiles/cortex/0/4/0_0.png").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "depth_out_of_range");
}

#[tokio::test]
async fn test_malformed_filename_returns_400() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    for uri in [
        "/tiles/cortex/0/0/00.png",
        "/tiles/cortex/0/0/0_0",
        "/tiles/cortex/0/0/a_b.png",
    ] {
        let response = get(router.clone(), uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "uri {}", uri);
        let body = json_body(response).await;
        assert_eq!(body["error"], "malformed_path");
    }
}

#[tokio::test]
async fn test_wrong_extension_returns_400() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/tiles/cortex/0/0/0_0.jpg").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"], "format_mismatch");
}

#[tokio::test]
async fn test_backend_down_returns_502() {
    let router = create_test_router(
        Arc::new(UnavailableArrayFetcher),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/tiles/cortex/0/0/0_0.png").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let body = json_body(response).await;
    assert_eq!(body["error"], "backend_unavailable");
}

// =============================================================================
// Cache Degradation
// =============================================================================

#[tokio::test]
async fn test_tile_served_while_cache_is_down() {
    let fetcher = Arc::new(MockArrayFetcher::new());
    let router = create_test_router(fetcher.clone(), Arc::new(UnavailableTileStore));

    let response = get(router.clone(), "/tiles/cortex/0/0/0_0.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-tile-cache-hit"], "false");

    // Without a cache every sequential request regenerates
    let response = get(router, "/tiles/cortex/0/0/0_0.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fetcher.call_count(), 2);
}

// =============================================================================
// Metadata Endpoints
// =============================================================================

#[tokio::test]
async fn test_health() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_dataset_listing() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/datasets").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let ids: Vec<&str> = body["datasets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(ids, ["cortex", "glia"]);
}

#[tokio::test]
async fn test_dataset_metadata() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/datasets/cortex").await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["id"], "cortex");
    assert_eq!(body["format"], "precomputed");
    assert_eq!(body["extent"], serde_json::json!([64, 64, 4]));
    assert_eq!(body["tile_width"], 16);
    assert_eq!(body["level_count"], 3);

    let levels = body["levels"].as_array().unwrap();
    assert_eq!(levels.len(), 3);
    // Level 1: extent 32x32 at stride 2, two tile rows and columns
    assert_eq!(levels[1]["scale"], 2);
    assert_eq!(levels[1]["width"], 32);
    assert_eq!(levels[1]["tiles_x"], 2);
}

#[tokio::test]
async fn test_unknown_dataset_metadata_returns_404() {
    let router = create_test_router(
        Arc::new(MockArrayFetcher::new()),
        Arc::new(MemoryTileStore::new()),
    );

    let response = get(router, "/datasets/missing").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
