//! Motion and media events

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Axis-aligned region in full-resolution frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width over height; 0.0 for a degenerate box.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            return 0.0;
        }
        self.width as f32 / self.height as f32
    }
}

/// One detection cycle's result: how much of the frame changed and where.
/// Produced and consumed within a single pipeline tick.
#[derive(Debug, Clone, PartialEq)]
pub struct MotionEvent {
    pub at: DateTime<Utc>,
    /// Changed fraction of the detection grid, in [0, 1].
    pub score: f32,
    /// Largest connected changed region, when one was found.
    pub region: Option<BoundingBox>,
}

/// Kind of persisted artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// "Artifact ready" notification published once a file is visible under its
/// final name. Delivery beyond the channel is the consumer's concern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEvent {
    pub path: PathBuf,
    pub kind: MediaKind,
}
