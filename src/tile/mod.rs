//! Tile rendering and the request-to-image pipeline.

mod encoder;
mod service;

pub use encoder::TileEncoder;
pub use service::TileService;

use bytes::Bytes;

/// A fully encoded tile, ready to serve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    /// Encoded PNG or JPEG bytes
    pub data: Bytes,

    /// MIME type matching the encoding
    pub content_type: &'static str,
}

impl TileImage {
    pub fn new(data: Bytes, content_type: &'static str) -> Self {
        Self { data, content_type }
    }
}
