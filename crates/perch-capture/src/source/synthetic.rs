//! Synthetic camera source
//!
//! Generates frames without hardware: a flat gray scene with a bright block
//! that jumps to a new corner every `block_every` frames. Used by the daemon's
//! `--test-source` flag and by pipeline tests.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::debug;

use perch_core::{CameraDescriptor, CameraKind, Frame, PixelFormat, Resolution, Result};

use super::{CameraSource, SOURCE_CHANNEL_DEPTH};

const BACKGROUND_LEVEL: u8 = 0x40;
const BLOCK_LEVEL: u8 = 0xc0;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub resolution: Resolution,
    pub fps: u32,
    /// Stop after this many frames; `None` runs until the receiver drops.
    pub frames: Option<u64>,
    /// Edge length of the moving block in pixels; 0 keeps the scene static.
    pub block_size: u32,
    /// The block jumps to the next corner every N frames.
    pub block_every: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            resolution: Resolution::new(640, 480),
            fps: 30,
            frames: None,
            block_size: 96,
            block_every: 90,
        }
    }
}

pub struct SyntheticSource {
    descriptor: CameraDescriptor,
    config: SyntheticConfig,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        let descriptor = CameraDescriptor {
            kind: CameraKind::GenericV4l2,
            path: "synthetic".into(),
            name: "Synthetic test source".to_string(),
            max_resolution: Some(config.resolution),
            autofocus: false,
        };
        Self { descriptor, config }
    }
}

impl CameraSource for SyntheticSource {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn open(&mut self) -> Result<mpsc::Receiver<Frame>> {
        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_DEPTH);
        let config = self.config.clone();
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_micros(1_000_000 / config.fps.max(1) as u64));
            let mut seq = 0u64;
            loop {
                ticker.tick().await;
                if let Some(limit) = config.frames {
                    if seq >= limit {
                        break;
                    }
                }
                if tx.send(render_frame(&config, seq)).await.is_err() {
                    break;
                }
                seq += 1;
            }
            debug!("synthetic source stopped after {seq} frames");
        });
        Ok(rx)
    }

    fn stop(&mut self) {
        // Nothing held; the generator task exits when the receiver drops.
    }
}

/// Render frame `seq`: flat background, block painted at the corner for the
/// current period.
pub fn render_frame(config: &SyntheticConfig, seq: u64) -> Frame {
    let Resolution { width, height } = config.resolution;
    let mut data = vec![BACKGROUND_LEVEL; PixelFormat::Rgb24.frame_size(config.resolution)];

    let block = config.block_size.min(width).min(height);
    if block > 0 {
        let slot = seq / config.block_every.max(1);
        let (bx, by) = corner_position(slot, config.resolution, block);
        for y in by..by + block {
            for x in bx..bx + block {
                let p = ((y * width + x) * 3) as usize;
                data[p] = BLOCK_LEVEL;
                data[p + 1] = BLOCK_LEVEL;
                data[p + 2] = BLOCK_LEVEL;
            }
        }
    }

    Frame::new(
        seq,
        Utc::now(),
        config.resolution,
        PixelFormat::Rgb24,
        Bytes::from(data),
    )
}

/// Cycle the block through the four corners.
fn corner_position(slot: u64, resolution: Resolution, block: u32) -> (u32, u32) {
    let right = resolution.width - block;
    let bottom = resolution.height - block;
    match slot % 4 {
        0 => (0, 0),
        1 => (right, 0),
        2 => (right, bottom),
        _ => (0, bottom),
    }
}
