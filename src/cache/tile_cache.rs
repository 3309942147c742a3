//! Cache-aside tile cache with singleflight coordination.
//!
//! The cache sits between the tile server and the external key/value store
//! and guarantees that, within one process, at most one generation is in
//! flight per cache key no matter how many requests ask for the same tile
//! concurrently. Across processes no lock is held: generation is
//! deterministic for a given key, so duplicate cross-process work is a
//! bounded inefficiency, not a correctness problem.
//!
//! # Protocol
//!
//! 1. GET the key; a hit short-circuits everything.
//! 2. On miss, consult the in-flight registry. An existing entry means
//!    another request is already generating this tile: suspend until it
//!    resolves, then re-check the cache and fall back to its recorded
//!    result.
//! 3. Otherwise register an entry and run the generator in a detached
//!    task that SETs the result, resolves the entry, and wakes all
//!    waiters. Detaching means a caller that disconnects mid-generation
//!    never aborts work other requests are waiting on.
//! 4. A generation failure is broadcast to every waiter as the same
//!    `Generation`-wrapped error; nobody hangs and nobody retries inside
//!    the same flight.
//!
//! Cache faults never fail a request: an unreachable store degrades to
//! direct generation and a failed write-back is logged and ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};

use crate::error::TileError;
use crate::tile::TileImage;

use super::store::TileStore;

// =============================================================================
// In-flight state
// =============================================================================

/// Shared completion handle for one in-flight generation.
///
/// The first request for a key creates it; later requests attach as
/// waiters. The generation task stores the outcome before notifying, so a
/// woken waiter always observes a resolved result.
struct InFlightState {
    notify: Notify,
    result: Mutex<Option<Result<TileImage, TileError>>>,
}

impl InFlightState {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            result: Mutex::new(None),
        }
    }
}

// =============================================================================
// TileCache
// =============================================================================

/// Cache-aside client over an external tile store, with per-key
/// singleflight coordination local to this process.
pub struct TileCache<S: TileStore> {
    store: Arc<S>,

    /// TTL applied on write-back; zero relies on the store's own eviction
    ttl: Duration,

    /// In-flight generations keyed by cache key
    in_flight: Arc<Mutex<HashMap<String, Arc<InFlightState>>>>,
}

impl<S: TileStore + 'static> TileCache<S> {
    /// Create a cache over the given store.
    pub fn new(store: Arc<S>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Return the tile for `key`, generating it at most once per flight.
    ///
    /// The boolean is true when the tile came straight from the external
    /// cache. `content_type` rebuilds the self-describing image on a hit;
    /// it must match what `generate` produces for this key.
    ///
    /// # Errors
    ///
    /// Fails only when generation fails (`Generation` wrapping the cause)
    /// or the generation task is lost (`Aborted`). Store faults degrade to
    /// direct generation and are logged, never surfaced.
    pub async fn get_or_generate<G, Fut>(
        &self,
        key: &str,
        content_type: &'static str,
        generate: G,
    ) -> Result<(TileImage, bool), TileError>
    where
        G: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<TileImage, TileError>> + Send + 'static,
    {
        // Step 1: cache lookup
        match self.store.get(key).await {
            Ok(Some(data)) => {
                return Ok((TileImage::new(data, content_type), true));
            }
            Ok(None) => {}
            Err(e) => {
                warn!(key = %key, "cache GET failed, degrading to generation: {}", e);
            }
        }

        let mut generate = Some(generate);

        loop {
            // Step 2/3: attach to an existing flight or become the leader
            let (state, leader) = {
                let mut in_flight = self.in_flight.lock().await;
                if let Some(state) = in_flight.get(key) {
                    (state.clone(), false)
                } else {
                    let state = Arc::new(InFlightState::new());
                    in_flight.insert(key.to_string(), state.clone());
                    (state, true)
                }
            };

            if leader {
                // The generator may only be invoked once; a second leader
                // round for the same call would be a protocol bug.
                let generate = generate
                    .take()
                    .ok_or_else(|| TileError::Aborted("generator consumed twice".to_string()))?;
                self.spawn_generation(key, &state, generate());
            }

            // Register for the wakeup before checking the result, so a
            // flight that completes in between cannot be missed.
            let notified = state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let resolved = { state.result.lock().await.clone() };
            let outcome = match resolved {
                Some(outcome) => outcome,
                None => {
                    notified.await;
                    if !leader {
                        // The leader has populated the cache on success;
                        // serve its write rather than its in-memory copy
                        // when possible.
                        if let Ok(Some(data)) = self.store.get(key).await {
                            return Ok((TileImage::new(data, content_type), true));
                        }
                    }
                    match { state.result.lock().await.clone() } {
                        Some(outcome) => outcome,
                        // Entry resolved without a recorded result; start over
                        None if leader => {
                            return Err(TileError::Aborted(
                                "generation resolved without a result".to_string(),
                            ))
                        }
                        None => continue,
                    }
                }
            };

            return outcome.map(|image| (image, false));
        }
    }

    /// Run the generator to completion in a detached task.
    ///
    /// The task, not the caller, owns write-back and waiter wakeup:
    /// cancellation of the requesting connection must never abort
    /// generation work that other requests share.
    fn spawn_generation<Fut>(&self, key: &str, state: &Arc<InFlightState>, fut: Fut)
    where
        Fut: std::future::Future<Output = Result<TileImage, TileError>> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let in_flight = Arc::clone(&self.in_flight);
        let state = Arc::clone(state);
        let key = key.to_string();
        let ttl = self.ttl;

        tokio::spawn(async move {
            let outcome = match fut.await {
                Ok(image) => {
                    // Only complete tiles reach the store; a failed
                    // write-back is an optimization lost, not an error.
                    if let Err(e) = store.set(&key, image.data.clone(), ttl).await {
                        warn!(key = %key, "cache SET failed, serving uncached tile: {}", e);
                    } else {
                        debug!(key = %key, bytes = image.data.len(), "tile cached");
                    }
                    Ok(image)
                }
                Err(e) => Err(TileError::Generation(Box::new(e))),
            };

            *state.result.lock().await = Some(outcome);
            in_flight.lock().await.remove(&key);
            state.notify.notify_waiters();
        });
    }

    /// Check for a cached tile without generating.
    ///
    /// Used by prefetch to skip spawning work for tiles that already
    /// exist. Store faults read as absent.
    pub async fn contains(&self, key: &str) -> bool {
        matches!(self.store.exists(key).await, Ok(true))
    }

    /// Number of generations currently in flight in this process.
    pub async fn in_flight_len(&self) -> usize {
        self.in_flight.lock().await.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
