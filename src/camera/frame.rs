//! Captured camera frame.
//!
//! A `Frame` is produced once per capture callback and never mutated after
//! construction. The pixel buffer sits behind an `Arc`, so handing the same
//! frame to the detection worker and to the renderer shares one immutable
//! buffer instead of copying it; the buffer is released when the last stage
//! holding it replaces it with a newer frame.

use std::sync::Arc;

use image::RgbaImage;

/// Monotonic sequence number assigned at ingestion.
pub type FrameSeq = u64;

#[derive(Debug, Clone)]
pub struct Frame {
    pub seq: FrameSeq,
    /// Capture timestamp in nanoseconds (producer clock).
    pub timestamp_ns: u64,
    pixels: Arc<RgbaImage>,
}

impl Frame {
    pub fn new(seq: FrameSeq, timestamp_ns: u64, pixels: RgbaImage) -> Self {
        Self {
            seq,
            timestamp_ns,
            pixels: Arc::new(pixels),
        }
    }

    /// 1x1 black frame shown before the first capture arrives.
    pub fn placeholder() -> Self {
        Self::new(0, 0, RgbaImage::from_pixel(1, 1, image::Rgba([0, 0, 0, 255])))
    }

    /// Blank frame of the given size, used by replayed sessions that carry no pixels.
    pub fn blank(seq: FrameSeq, timestamp_ns: u64, width: u32, height: u32) -> Self {
        Self::new(
            seq,
            timestamp_ns,
            RgbaImage::from_pixel(width, height, image::Rgba([0, 0, 0, 255])),
        )
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Number of stages currently holding this pixel buffer.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.pixels)
    }
}
