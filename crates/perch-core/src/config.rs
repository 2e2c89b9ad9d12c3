//! Configuration consumed by the pipeline crates
//!
//! These are plain structs; reading them from the environment is the
//! daemon binary's job.

use std::path::PathBuf;
use std::time::Duration;

use crate::{CameraKind, CameraTuning, Resolution};

/// Camera selection, capture geometry, and tuning.
#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub kind: CameraKind,
    pub resolution: Resolution,
    pub fps: u32,
    pub tuning: CameraTuning,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            kind: CameraKind::PiHq,
            resolution: Resolution::new(1920, 1080),
            fps: 30,
            tuning: CameraTuning::default(),
        }
    }
}

/// How the motion detector maintains its rolling reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferenceStrategy {
    /// Reference is simply the previous frame.
    FrameDiff,
    /// Exponential moving average: adapts to slow lighting changes while a
    /// sudden scene change still registers as motion.
    Background { alpha: f32 },
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Minimum changed fraction of the detection grid, in [0, 1], for a
    /// motion event to fire.
    pub sensitivity: f32,
    /// Per-pixel luma delta that counts as "changed".
    pub delta_threshold: u8,
    /// Detection grid is the frame resolution divided by this factor; the
    /// full-resolution frame is reserved for photo artifacts.
    pub downsample: u32,
    pub strategy: ReferenceStrategy,
    /// Shape gate on the largest changed region: regions thinner or wider
    /// than these aspect bounds (shadows, drifting clouds) are discarded.
    pub min_aspect: f32,
    pub max_aspect: f32,
    /// Evaluate motion on every Nth frame to bound CPU on the board.
    pub cadence: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sensitivity: 0.02,
            delta_threshold: 25,
            downsample: 4,
            strategy: ReferenceStrategy::Background { alpha: 0.05 },
            min_aspect: 0.4,
            max_aspect: 2.5,
            cadence: 5,
        }
    }
}

/// What a capture session produces.
#[derive(Debug, Clone)]
pub enum CaptureMode {
    /// A burst of stills, `spacing` apart.
    Photo { count: u32, spacing: Duration },
    /// One video clip.
    Video,
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub mode: CaptureMode,
    /// A clip runs at least this long.
    pub min_duration: Duration,
    /// A clip never runs longer than this, even under sustained motion.
    pub max_duration: Duration,
    /// Motion must be absent this long (after `min_duration`) to close a clip.
    pub quiet_period: Duration,
    /// No new session may open within this interval after one completes.
    pub cooldown: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Photo {
                count: 3,
                spacing: Duration::from_secs(2),
            },
            min_duration: Duration::from_secs(5),
            max_duration: Duration::from_secs(30),
            quiet_period: Duration::from_secs(2),
            cooldown: Duration::from_secs(30),
        }
    }
}

/// Artifact persistence and notification settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Root of the date-partitioned output tree.
    pub output_root: PathBuf,
    pub jpeg_quality: u8,
    /// Playback rate stamped into muxed clips.
    pub clip_fps: u32,
    /// Clip frames beyond this are dropped (and counted), never buffered
    /// without bound.
    pub max_clip_frames: usize,
    /// Writer command queue depth.
    pub queue_depth: usize,
    /// Output watcher poll interval.
    pub poll_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from("media"),
            jpeg_quality: 90,
            clip_fps: 30,
            max_clip_frames: 900,
            queue_depth: 64,
            poll_interval: Duration::from_millis(500),
        }
    }
}
