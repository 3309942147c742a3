//! Configuration for the tile frontend and the array backend.
//!
//! Both tiers are built into one binary with a subcommand each. Every
//! option can be set on the command line or through an `NDT_`-prefixed
//! environment variable.
//!
//! # Environment Variables
//!
//! - `NDT_HOST` - Bind address (default: 0.0.0.0)
//! - `NDT_PORT` - Frontend port (default: 8000)
//! - `NDT_DATASETS` - Path to the datasets JSON file (required)
//! - `NDT_CACHE_URL` - Redis URL of the tile cache (default: redis://127.0.0.1:6379/)
//! - `NDT_CACHE_TTL` - Cached tile TTL in seconds, 0 = no expiry (default: 0)
//! - `NDT_BACKEND_ENDPOINT` - Array backend base URL (default: http://127.0.0.1:9090)
//! - `NDT_CACHE_MAX_AGE` - HTTP Cache-Control max-age seconds (default: 3600)
//! - `NDT_CORS_ORIGINS` - Allowed CORS origins, comma-separated
//! - `NDT_PREFETCH_ADJACENT_Z` - Warm neighbouring depth slices (default: false)
//! - `NDT_BACKEND_PORT` - Backend port (default: 9090)
//! - `NDT_STORE_ENDPOINT` - Array store base URL (required for `backend`)
//! - `NDT_BACKEND_PERMITS` - Max concurrent array reads (default: 16)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Default Values
// =============================================================================

/// Default bind address.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default frontend port.
pub const DEFAULT_FRONTEND_PORT: u16 = 8000;

/// Default backend port.
pub const DEFAULT_BACKEND_PORT: u16 = 9090;

/// Default Redis URL for the tile cache.
pub const DEFAULT_CACHE_URL: &str = "redis://127.0.0.1:6379/";

/// Default backend endpoint.
pub const DEFAULT_BACKEND_ENDPOINT: &str = "http://127.0.0.1:9090";

/// Default cached tile TTL in seconds (0 = rely on cache-server eviction).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 0;

/// Default number of concurrent array reads on the backend.
pub const DEFAULT_BACKEND_PERMITS: usize = 16;

/// Default HTTP cache max-age in seconds (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

// =============================================================================
// CLI
// =============================================================================

/// Tile server for N-dimensional array datasets.
///
/// Serves CATMAID tile-source-4 tiles cut from large array volumes, with
/// an external Redis cache and a concurrency-bounded array backend tier.
#[derive(Parser, Debug)]
#[command(name = "ndtiler")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the tile frontend
    Serve(ServeConfig),

    /// Run the array access backend
    Backend(BackendConfig),
}

// =============================================================================
// Serve Configuration
// =============================================================================

/// Configuration for the tile frontend.
#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "NDT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_FRONTEND_PORT, env = "NDT_PORT")]
    pub port: u16,

    /// Path to the datasets JSON file.
    #[arg(long, env = "NDT_DATASETS")]
    pub datasets: PathBuf,

    /// Redis URL of the external tile cache.
    #[arg(long, default_value = DEFAULT_CACHE_URL, env = "NDT_CACHE_URL")]
    pub cache_url: String,

    /// TTL in seconds for cached tiles.
    ///
    /// 0 stores tiles without expiry, leaving eviction to the cache
    /// server's memory-pressure policy.
    #[arg(long, default_value_t = DEFAULT_CACHE_TTL_SECS, env = "NDT_CACHE_TTL")]
    pub cache_ttl: u64,

    /// Base URL of the array access backend.
    #[arg(long, default_value = DEFAULT_BACKEND_ENDPOINT, env = "NDT_BACKEND_ENDPOINT")]
    pub backend_endpoint: String,

    /// HTTP Cache-Control max-age in seconds for tile responses.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "NDT_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "NDT_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Warm the neighbouring depth slices after each served tile.
    #[arg(long, default_value_t = false, env = "NDT_PREFETCH_ADJACENT_Z")]
    pub prefetch_adjacent_z: bool,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.datasets.as_os_str().is_empty() {
            return Err("datasets file is required. Set --datasets or NDT_DATASETS".to_string());
        }
        if !self.cache_url.starts_with("redis://") && !self.cache_url.starts_with("rediss://") {
            return Err(format!(
                "cache_url '{}' must be a redis:// or rediss:// URL",
                self.cache_url
            ));
        }
        validate_http_endpoint("backend_endpoint", &self.backend_endpoint)?;
        Ok(())
    }

    /// Server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Cached tile TTL as a duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl)
    }
}

// =============================================================================
// Backend Configuration
// =============================================================================

/// Configuration for the array access backend.
#[derive(Args, Debug, Clone)]
pub struct BackendConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "NDT_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_BACKEND_PORT, env = "NDT_BACKEND_PORT")]
    pub port: u16,

    /// Path to the datasets JSON file.
    ///
    /// Must describe the same catalog as the frontend's file; the backend
    /// validates every region against it.
    #[arg(long, env = "NDT_DATASETS")]
    pub datasets: PathBuf,

    /// Base URL of the array store speaking the region wire contract.
    #[arg(long, env = "NDT_STORE_ENDPOINT")]
    pub store_endpoint: String,

    /// Maximum number of concurrent array reads.
    ///
    /// Excess requests queue rather than fail.
    #[arg(long, default_value_t = DEFAULT_BACKEND_PERMITS, env = "NDT_BACKEND_PERMITS")]
    pub permits: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl BackendConfig {
    /// Validate the configuration and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.datasets.as_os_str().is_empty() {
            return Err("datasets file is required. Set --datasets or NDT_DATASETS".to_string());
        }
        validate_http_endpoint("store_endpoint", &self.store_endpoint)?;
        if self.permits == 0 {
            return Err("permits must be greater than 0".to_string());
        }
        Ok(())
    }

    /// Server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn validate_http_endpoint(name: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} is required", name));
    }
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(format!("{} '{}' must be an http(s) URL", name, value));
    }
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
