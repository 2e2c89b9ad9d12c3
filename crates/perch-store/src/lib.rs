//! Media persistence and new-media notification
//!
//! - **`metadata`**: the capture-metadata document embedded into artifacts
//! - **`photo`**: JPEG encoding with the metadata as a container segment
//! - **`video`**: clip muxing through an ffmpeg child process
//! - **`writer`**: the worker owning artifact assembly and the
//!   write-to-temporary-then-rename discipline
//! - **`watcher`**: output-directory observation publishing [`perch_core::MediaEvent`]s

mod metadata;
mod photo;
mod video;
mod watcher;
mod writer;

pub use metadata::{CaptureMetadata, MotionSummary};
pub use photo::{encode_photo, read_embedded_metadata};
pub use video::mux_clip;
pub use watcher::OutputWatcher;
pub use writer::{CameraSnapshot, MediaWriter, WriterCommand, WriterEvent, WriterHandle};
