//! External key/value tile store clients.
//!
//! The cache server (Redis/Dragonfly) is an external component with its own
//! eviction policy; this module only speaks its GET/SET wire contract.
//! Entries may disappear between a SET and a later GET at any time, so
//! callers always re-check on miss and never rely on presence.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::AsyncCommands;
use tokio::time::timeout;

use crate::error::CacheError;

/// Default per-operation timeout for cache round-trips.
pub const DEFAULT_CACHE_OP_TIMEOUT: Duration = Duration::from_millis(250);

// =============================================================================
// TileStore trait
// =============================================================================

/// Byte-oriented key/value store capability.
///
/// Keys and values are opaque to the store. Single-key GET/SET atomicity is
/// the store's own concern and is assumed, not reimplemented.
#[async_trait]
pub trait TileStore: Send + Sync {
    /// Fetch the value for `key`, if present.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    /// Store `value` under `key`.
    ///
    /// A zero `ttl` stores without expiry, leaving eviction entirely to the
    /// cache server's memory-pressure policy.
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    /// Check for presence without transferring the value.
    async fn exists(&self, key: &str) -> Result<bool, CacheError>;
}

// =============================================================================
// RedisTileStore
// =============================================================================

/// Redis-backed tile store using a multiplexed async connection.
pub struct RedisTileStore {
    client: redis::Client,
    op_timeout: Duration,
}

impl RedisTileStore {
    /// Create a store client for the given Redis URL.
    ///
    /// The URL is validated here; the connection itself is established
    /// lazily per operation, so a cache server that is down at startup
    /// only degrades requests rather than failing the process.
    pub fn new(url: &str) -> Result<Self, CacheError> {
        Self::with_timeout(url, DEFAULT_CACHE_OP_TIMEOUT)
    }

    /// Create a store client with a custom per-operation timeout.
    pub fn with_timeout(url: &str, op_timeout: Duration) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Unavailable(e.to_string()))?;
        Ok(Self { client, op_timeout })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheError::Unavailable(e.to_string()))
    }

    async fn bounded<T>(
        &self,
        op: impl std::future::Future<Output = Result<T, CacheError>>,
    ) -> Result<T, CacheError> {
        timeout(self.op_timeout, op)
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout.as_millis() as u64))?
    }
}

#[async_trait]
impl TileStore for RedisTileStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let value: Option<Vec<u8>> = conn
                .get(key)
                .await
                .map_err(|e| CacheError::Unavailable(e.to_string()))?;
            Ok(value.map(Bytes::from))
        })
        .await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let payload = value.to_vec();
            if ttl.is_zero() {
                let _: () = conn
                    .set(key, payload)
                    .await
                    .map_err(|e| CacheError::Unavailable(e.to_string()))?;
            } else {
                let _: () = conn
                    .set_ex(key, payload, ttl.as_secs().max(1))
                    .await
                    .map_err(|e| CacheError::Unavailable(e.to_string()))?;
            }
            Ok(())
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            conn.exists(key)
                .await
                .map_err(|e| CacheError::Unavailable(e.to_string()))
        })
        .await
    }
}

// =============================================================================
// Tests
// =============================================================================
