//! Tile encoder: raw samples to PNG/JPEG.
//!
//! The encoder is the only place pixel values are touched. It normalizes
//! u8/u16 samples into the 8-bit display range, pads clipped edge regions
//! out to the full tile dimensions with the dataset's background value,
//! and hands the result to the `image` codecs. Every tile it produces has
//! exactly the configured pixel dimensions, so clients never special-case
//! the dataset boundary.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, GrayImage, ImageEncoder};

use crate::array::{RawSampleBlock, SampleDtype};
use crate::coords::ArrayRegion;
use crate::dataset::{DatasetDescriptor, IntensityRange, TileFormat};
use crate::error::EncodeError;

use super::TileImage;

// =============================================================================
// TileEncoder
// =============================================================================

/// Stateless renderer from sample blocks to encoded tiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct TileEncoder;

impl TileEncoder {
    pub fn new() -> Self {
        Self
    }

    /// Render `block` into a full-size tile for the region it covers.
    ///
    /// The block is placed at the tile's top-left; any remainder (an edge
    /// tile clipped against the dataset extent) is filled with the
    /// dataset's background value.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` when the block does not match the region's sample
    /// shape or exceeds the tile grid, `ShortBlock` when the payload is
    /// smaller than its declared shape requires.
    pub fn encode(
        &self,
        block: &RawSampleBlock,
        region: &ArrayRegion,
        dataset: &DatasetDescriptor,
    ) -> Result<TileImage, EncodeError> {
        let tile_w = dataset.tile_width as u64;
        let tile_h = dataset.tile_height as u64;

        let rows = block.rows();
        let cols = block.cols();

        // The backend must return exactly the samples the clipped region
        // covers at its level, and a clipped region can never exceed the
        // tile grid.
        let scale = dataset.downsample_factor.saturating_pow(region.level);
        let (expected_cols, expected_rows) = region.sample_shape(scale);
        if rows != expected_rows || cols != expected_cols || rows > tile_h || cols > tile_w {
            return Err(EncodeError::ShapeMismatch {
                rows,
                cols,
                expected_rows,
                expected_cols,
            });
        }

        let expected = block.expected_len();
        if block.data.len() < expected {
            return Err(EncodeError::ShortBlock {
                expected,
                actual: block.data.len(),
            });
        }

        let mut pixels = vec![dataset.background; (tile_w * tile_h) as usize];
        for r in 0..rows as usize {
            for c in 0..cols as usize {
                let sample = read_sample(block, r * cols as usize + c);
                pixels[r * tile_w as usize + c] = display_value(sample, block.dtype, dataset);
            }
        }

        self.encode_pixels(pixels, dataset)
    }

    /// Render a tile with no data: every pixel is the background value.
    ///
    /// Served for tiles whose region clips to empty, without any backend
    /// round-trip.
    pub fn background_tile(&self, dataset: &DatasetDescriptor) -> Result<TileImage, EncodeError> {
        let len = dataset.tile_width as usize * dataset.tile_height as usize;
        self.encode_pixels(vec![dataset.background; len], dataset)
    }

    fn encode_pixels(
        &self,
        pixels: Vec<u8>,
        dataset: &DatasetDescriptor,
    ) -> Result<TileImage, EncodeError> {
        let width = dataset.tile_width;
        let height = dataset.tile_height;

        let mut out = Vec::new();
        match dataset.output {
            TileFormat::Png => {
                PngEncoder::new(&mut out)
                    .write_image(&pixels, width, height, ExtendedColorType::L8)
                    .map_err(|e| EncodeError::Image(e.to_string()))?;
            }
            TileFormat::Jpeg => {
                let image = GrayImage::from_raw(width, height, pixels).ok_or_else(|| {
                    EncodeError::Image("pixel buffer does not match tile dimensions".to_string())
                })?;
                let mut encoder = JpegEncoder::new_with_quality(&mut out, dataset.jpeg_quality);
                encoder
                    .encode_image(&image)
                    .map_err(|e| EncodeError::Image(e.to_string()))?;
            }
        }

        Ok(TileImage::new(
            Bytes::from(out),
            dataset.output.content_type(),
        ))
    }
}

/// Read the `index`-th sample as f64, decoding the little-endian wire
/// layout.
fn read_sample(block: &RawSampleBlock, index: usize) -> f64 {
    match block.dtype {
        SampleDtype::U8 => block.data[index] as f64,
        SampleDtype::U16 => {
            let offset = index * 2;
            u16::from_le_bytes([block.data[offset], block.data[offset + 1]]) as f64
        }
    }
}

/// Map a raw sample to an 8-bit display value.
///
/// With a configured intensity range the sample is windowed into it;
/// otherwise the dtype's full range maps linearly onto 0..=255 (identity
/// for u8).
fn display_value(sample: f64, dtype: SampleDtype, dataset: &DatasetDescriptor) -> u8 {
    let range = dataset.intensity.unwrap_or(IntensityRange {
        min: 0.0,
        max: dtype.max_value(),
    });
    // Descriptor validation guarantees max > min
    let unit = ((sample - range.min) / (range.max - range.min)).clamp(0.0, 1.0);
    (unit * 255.0).round() as u8
}

// =============================================================================
// Tests
// =============================================================================
