//! Error taxonomy for the capture pipeline

use std::fmt;

use crate::{CameraDescriptor, CameraKind};

/// Result type alias used throughout the pipeline crates.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No enumerated device matches the configured camera identity. Fatal at
    /// startup: the process must exit rather than guess at another camera.
    /// Carries the full enumeration so the diagnostic can list what exists.
    #[error("camera not found: no '{requested}' device connected ({} device(s) enumerated)", .available.len())]
    CameraNotFound {
        requested: CameraKind,
        available: Vec<CameraDescriptor>,
    },

    /// A tuning control is outside its accepted range. Fatal at startup.
    #[error("invalid tuning: {0}")]
    InvalidTuning(String),

    /// The camera stopped producing frames past the retry bound. Fatal at
    /// runtime; restart policy belongs to the process supervisor.
    #[error("camera disconnected: {0}")]
    CameraDisconnected(String),

    /// Artifact persistence failed. Aborts the capture session, never the
    /// process.
    #[error("write failure: {0}")]
    WriteFailure(String),

    /// Encoding or metadata serialization failed.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bad configuration value.
    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Non-fatal notice that devices of a different kind were enumerated
/// alongside (or instead of) the configured kind. The caller may log it so
/// an operator can spot a camera plugged in but not configured.
#[derive(Debug, Clone)]
pub struct MismatchWarning {
    pub configured: CameraKind,
    pub others: Vec<CameraDescriptor>,
}

impl fmt::Display for MismatchWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "devices present that are not the configured '{}' type:",
            self.configured
        )?;
        for cam in &self.others {
            write!(f, " [{cam}]")?;
        }
        Ok(())
    }
}
