//! Perch core types
//!
//! Shared data model for the capture pipeline:
//!
//! - **Frames**: timestamped raw pixel buffers ([`Frame`], [`PixelFormat`])
//! - **Camera identity**: enumeration descriptors and device tuning
//!   ([`CameraDescriptor`], [`CameraTuning`])
//! - **Events**: motion detections and new-media notifications
//!   ([`MotionEvent`], [`MediaEvent`])
//! - **Configuration**: plain structs consumed by the pipeline crates
//! - **Errors**: the startup/runtime failure taxonomy ([`Error`])

mod camera;
mod config;
mod error;
mod event;
mod frame;

pub use camera::{CameraDescriptor, CameraKind, CameraTuning, WhiteBalanceMode};
pub use config::{
    CameraConfig, CaptureMode, ControllerConfig, DetectorConfig, ReferenceStrategy, StoreConfig,
};
pub use error::{Error, MismatchWarning, Result};
pub use event::{BoundingBox, MediaEvent, MediaKind, MotionEvent};
pub use frame::{Frame, PixelFormat, Resolution};
