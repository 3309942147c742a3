//! Concurrency and two-tier integration tests.
//!
//! Tests verify:
//! - Singleflight at the HTTP level: concurrent requests for one tile
//!   produce one generation and identical bytes
//! - Full frontend-to-backend flow over the region wire contract

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use ndtiler::{
    backend_router, ArrayAccessService, RemoteArrayClient, RouterConfig, TileCache, TileService,
};

use super::test_utils::{
    create_test_router, is_valid_png, MemoryTileStore, MockArrayFetcher, test_registry,
};

#[tokio::test]
async fn test_concurrent_requests_share_one_generation() {
    let fetcher = Arc::new(MockArrayFetcher::new());
    let store = Arc::new(MemoryTileStore::new());
    let router = create_test_router(fetcher.clone(), store);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let router = router.clone();
        handles.push(tokio::spawn(async move {
            let request = Request::builder()
                .uri("/tiles/cortex/1/2/1_1.png")
                .body(Body::empty())
                .unwrap();
            let response = router.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            response.into_body().collect().await.unwrap().to_bytes()
        }));
    }

    let mut bodies = Vec::new();
    for handle in handles {
        bodies.push(handle.await.unwrap());
    }

    assert_eq!(fetcher.call_count(), 1);
    for body in &bodies {
        assert_eq!(body, &bodies[0]);
        assert!(is_valid_png(body));
    }
}

#[tokio::test]
async fn test_distinct_tiles_generate_independently() {
    let fetcher = Arc::new(MockArrayFetcher::new());
    let store = Arc::new(MemoryTileStore::new());
    let router = create_test_router(fetcher.clone(), store.clone());

    let mut handles = Vec::new();
    for col in 0..4 {
        let router = router.clone();
        let uri = format!("/tiles/cortex/0/0/0_{}.png", col);
        handles.push(tokio::spawn(async move {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = router.oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(fetcher.call_count(), 4);
    assert_eq!(store.len().await, 4);
}

// =============================================================================
// Two-tier flow
// =============================================================================

/// Serve `router` on an ephemeral port, returning its base URL.
async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_tile_served_through_backend_tier() {
    // Backend tier: semaphore-bounded service over the mock array store
    let store_fetcher = Arc::new(MockArrayFetcher::new());
    let backend = Arc::new(ArrayAccessService::new(
        test_registry(),
        store_fetcher.clone(),
        4,
    ));
    let backend_url = spawn_server(backend_router(backend)).await;

    // Frontend tier: remote client pointed at the backend over real HTTP
    let client = Arc::new(RemoteArrayClient::new(backend_url));
    let cache = Arc::new(TileCache::new(
        Arc::new(MemoryTileStore::new()),
        std::time::Duration::ZERO,
    ));
    let service = TileService::new(test_registry(), client, cache);
    let router = ndtiler::create_router(service, RouterConfig::new().with_tracing(false));

    let request = Request::builder()
        .uri("/tiles/cortex/0/1/2_3.png")
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert!(is_valid_png(&body));
    assert_eq!(store_fetcher.call_count(), 1);

    // The second request never reaches the backend
    let request = Request::builder()
        .uri("/tiles/cortex/0/1/2_3.png")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-tile-cache-hit"], "true");
    assert_eq!(store_fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_backend_rejection_maps_to_frontend_500() {
    // Backend with a catalog missing the frontend's dataset: regions are
    // rejected as out of range, which the frontend reports as an internal
    // inconsistency rather than retrying.
    let backend = Arc::new(ArrayAccessService::new(
        Arc::new(ndtiler::DatasetRegistry::new(vec![]).unwrap()),
        Arc::new(MockArrayFetcher::new()),
        4,
    ));
    let backend_url = spawn_server(backend_router(backend)).await;

    let client = Arc::new(RemoteArrayClient::new(backend_url));
    let cache = Arc::new(TileCache::new(
        Arc::new(MemoryTileStore::new()),
        std::time::Duration::ZERO,
    ));
    let service = TileService::new(test_registry(), client, cache);
    let router = ndtiler::create_router(service, RouterConfig::new().with_tracing(false));

    let request = Request::builder()
        .uri("/tiles/cortex/0/0/0_0.png")
        .body(Body::empty())
        .unwrap();
    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
