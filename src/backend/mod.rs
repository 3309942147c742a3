//! Array access tier: the backend HTTP service and its frontend client.
//!
//! Both ends of the region wire contract live here. The backend wraps an
//! [`ArrayFetcher`](crate::array::ArrayFetcher) with a semaphore bound
//! and exposes `POST /region`; the frontend's [`RemoteArrayClient`]
//! speaks the same contract with bounded retry. The contract is also how
//! the backend reaches the actual array store, so one client type serves
//! both hops.

mod client;
mod service;

pub use client::{RemoteArrayClient, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BACKOFF};
pub use service::{backend_router, ArrayAccessService};

/// Response header carrying the sample dtype (`u8` | `u16`).
pub const DTYPE_HEADER: &str = "x-array-dtype";

/// Response header carrying the block shape as `{rows}x{cols}`.
pub const SHAPE_HEADER: &str = "x-array-shape";

/// Render a block shape for the wire.
pub fn format_shape(shape: [u64; 2]) -> String {
    format!("{}x{}", shape[0], shape[1])
}

/// Parse a wire shape header value.
pub fn parse_shape(value: &str) -> Option<[u64; 2]> {
    let (rows, cols) = value.split_once('x')?;
    Some([rows.parse().ok()?, cols.parse().ok()?])
}
