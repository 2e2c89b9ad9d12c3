//! Raw frame types shared across the capture pipeline

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Capture resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count.
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel layout of a raw frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Packed 8-bit RGB, 3 bytes per pixel.
    Rgb24,
    /// Planar YUV 4:2:0 (I420): full-resolution Y plane followed by
    /// quarter-resolution U and V planes.
    Yuv420,
}

impl PixelFormat {
    /// Size in bytes of one frame at the given resolution.
    pub fn frame_size(&self, resolution: Resolution) -> usize {
        let area = resolution.area() as usize;
        match self {
            PixelFormat::Rgb24 => area * 3,
            PixelFormat::Yuv420 => area * 3 / 2,
        }
    }
}

/// A single captured frame.
///
/// Owned by the acquisition side until handed to the motion detector; the
/// payload is `Bytes` so handing a frame to the clip buffer or the writer
/// worker is a cheap reference-count bump, not a copy.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Monotonic sequence number within the capture process.
    pub seq: u64,
    /// Wall-clock capture time.
    pub captured_at: DateTime<Utc>,
    pub resolution: Resolution,
    pub format: PixelFormat,
    pub data: Bytes,
}

impl Frame {
    pub fn new(
        seq: u64,
        captured_at: DateTime<Utc>,
        resolution: Resolution,
        format: PixelFormat,
        data: Bytes,
    ) -> Self {
        Self {
            seq,
            captured_at,
            resolution,
            format,
            data,
        }
    }

    /// Luma (grayscale) value of the pixel at `(x, y)`.
    ///
    /// For YUV frames this is a direct read from the Y plane; for RGB it is
    /// the BT.601 integer luma. Coordinates must be inside the resolution.
    pub fn luma(&self, x: u32, y: u32) -> u8 {
        let w = self.resolution.width as usize;
        let idx = y as usize * w + x as usize;
        match self.format {
            PixelFormat::Yuv420 => self.data[idx],
            PixelFormat::Rgb24 => {
                let p = idx * 3;
                let r = self.data[p] as u32;
                let g = self.data[p + 1] as u32;
                let b = self.data[p + 2] as u32;
                // Video-range BT.601 luma, matching what a YUV source's Y
                // plane would carry for the same scene.
                (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16) as u8
            }
        }
    }
}
