//! ndtiler - CATMAID-style tile server for N-dimensional array datasets.
//!
//! This binary hosts both tiers: `serve` runs the tile frontend, `backend`
//! runs the concurrency-bounded array access service.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ndtiler::{
    backend::{backend_router, ArrayAccessService, RemoteArrayClient},
    cache::{RedisTileStore, TileCache},
    config::{BackendConfig, Cli, Command, ServeConfig},
    dataset::DatasetRegistry,
    server::{create_router, RouterConfig},
    tile::TileService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve(config) => run_serve(config).await,
        Command::Backend(config) => run_backend(config).await,
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let registry = match DatasetRegistry::from_file(&config.datasets) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to load datasets: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Datasets: {} ({})", config.datasets.display(), registry.len());
    for id in registry.ids() {
        info!("    - {}", id);
    }
    info!("  Cache: {}", config.cache_url);
    if config.cache_ttl == 0 {
        info!("  Cache TTL: none (server eviction)");
    } else {
        info!("  Cache TTL: {}s", config.cache_ttl);
    }
    info!("  Backend: {}", config.backend_endpoint);
    if config.prefetch_adjacent_z {
        info!("  Prefetch: adjacent depth slices");
    }

    // The Redis connection is lazy; a cache that is down at startup only
    // degrades requests, so there is no connectivity check here.
    let store = match RedisTileStore::new(&config.cache_url) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Invalid cache URL: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let cache = Arc::new(TileCache::new(store, config.cache_ttl()));
    let fetcher = Arc::new(RemoteArrayClient::new(&config.backend_endpoint));

    let tile_service = TileService::new(registry, fetcher, cache)
        .with_adjacent_prefetch(config.prefetch_adjacent_z);

    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing);
    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    let router = create_router(tile_service, router_config);

    serve(&config.bind_address(), router).await
}

// =============================================================================
// Backend Command
// =============================================================================

async fn run_backend(config: BackendConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let registry = match DatasetRegistry::from_file(&config.datasets) {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to load datasets: {}", e);
            return ExitCode::FAILURE;
        }
    };

    info!("Configuration:");
    info!("  Datasets: {} ({})", config.datasets.display(), registry.len());
    info!("  Array store: {}", config.store_endpoint);
    info!("  Concurrent reads: {}", config.permits);

    let store_client = Arc::new(RemoteArrayClient::new(&config.store_endpoint));
    let service = Arc::new(ArrayAccessService::new(
        registry,
        store_client,
        config.permits,
    ));
    let router = backend_router(service);

    serve(&config.bind_address(), router).await
}

// =============================================================================
// Shared
// =============================================================================

async fn serve(addr: &str, router: axum::Router) -> ExitCode {
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, router).await {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "ndtiler=debug,tower_http=debug"
    } else {
        "ndtiler=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
