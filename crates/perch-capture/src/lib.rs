//! Capture pipeline for the perch wildlife camera
//!
//! Modules, in pipeline order:
//!
//! - **`source`**: device enumeration, explicit camera selection, and the
//!   [`CameraSource`](source::CameraSource) implementations per device family
//! - **`acquisition`**: the bounded-rate frame loop with retry/backoff and a
//!   single fatal disconnect
//! - **`motion`**: rolling-reference motion scoring with region extraction
//! - **`controller`**: the capture-decision state machine

pub mod acquisition;
pub mod controller;
pub mod motion;
pub mod source;

pub use acquisition::{AcquisitionConfig, FrameStream};
pub use controller::{CaptureAction, CaptureController, Session, State};
pub use motion::MotionDetector;
pub use source::{enumerate, open_source, select, CameraSource};
