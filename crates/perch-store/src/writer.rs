//! Media writer worker
//!
//! Owns artifact assembly off the capture loop: date-partitioned layout,
//! write-to-temporary-name-then-atomic-rename, photo encoding and clip
//! muxing. The inbound channel is bounded; when the writer falls behind,
//! clip frames are dropped and counted, never buffered without bound.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use perch_core::{
    CameraKind, CameraTuning, Error, Frame, MediaEvent, MediaKind, Resolution, Result, StoreConfig,
};

use crate::{photo, video, CaptureMetadata, MotionSummary};

/// Camera identity and tuning snapshot, fixed for the process lifetime and
/// embedded into every artifact.
#[derive(Debug, Clone)]
pub struct CameraSnapshot {
    pub kind: CameraKind,
    pub name: String,
    pub tuning: CameraTuning,
}

/// Commands from the capture pipeline.
#[derive(Debug)]
pub enum WriterCommand {
    Open {
        started: DateTime<Utc>,
        motion: Option<MotionSummary>,
    },
    Photo {
        index: u32,
        frame: Frame,
    },
    ClipFrame(Frame),
    Close,
    Abort,
}

/// Feedback to the pipeline.
#[derive(Debug)]
pub enum WriterEvent {
    /// Artifact visible under its final name.
    Written(MediaEvent),
    /// Persistence failed; the session should abort to cooldown.
    Failed(String),
}

/// Pipeline-side handle to the writer worker.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<WriterCommand>,
    dropped: Arc<AtomicU64>,
}

impl WriterHandle {
    /// Queue a clip frame without ever blocking the capture loop. A full
    /// queue drops the frame and counts it.
    pub fn push_clip_frame(&self, frame: Frame) {
        match self.tx.try_send(WriterCommand::ClipFrame(frame)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                let n = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                if n == 1 || n % 30 == 0 {
                    warn!(dropped = n, "writer behind, dropping clip frames");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => warn!("media writer is gone"),
        }
    }

    /// Session-control commands (open/photo/close/abort) are never dropped.
    pub async fn send(&self, command: WriterCommand) {
        if self.tx.send(command).await.is_err() {
            warn!("media writer is gone");
        }
    }

    /// Clip frames dropped so far because the writer fell behind.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub struct MediaWriter;

impl MediaWriter {
    /// Spawn the worker. Returns the command handle and the event stream.
    pub fn start(
        config: StoreConfig,
        camera: CameraSnapshot,
    ) -> (WriterHandle, mpsc::Receiver<WriterEvent>) {
        let (tx, rx) = mpsc::channel(config.queue_depth.max(1));
        let (event_tx, event_rx) = mpsc::channel(16);
        let dropped = Arc::new(AtomicU64::new(0));
        tokio::spawn(run_worker(config, camera, rx, event_tx, dropped.clone()));
        (WriterHandle { tx, dropped }, event_rx)
    }
}

/// One open session's writer-side assembly state.
struct OpenSession {
    dir: PathBuf,
    stem: String,
    started: DateTime<Utc>,
    motion: Option<MotionSummary>,
    clip: Vec<Frame>,
}

impl OpenSession {
    fn new(config: &StoreConfig, started: DateTime<Utc>, motion: Option<MotionSummary>) -> Self {
        let local = started.with_timezone(&Local);
        Self {
            dir: config
                .output_root
                .join(local.format("%Y-%m-%d").to_string()),
            stem: format!("perch_{}", local.format("%Y%m%d_%H%M%S")),
            started,
            motion,
            clip: Vec::new(),
        }
    }

    fn metadata(&self, camera: &CameraSnapshot, resolution: Resolution) -> CaptureMetadata {
        CaptureMetadata {
            captured_at: self.started,
            camera_kind: camera.kind,
            camera_name: camera.name.clone(),
            resolution,
            tuning: camera.tuning.clone(),
            motion: self.motion.clone(),
        }
    }

    fn photo_name(&self, index: u32) -> String {
        format!("{}_{index}.jpg", self.stem)
    }

    fn clip_name(&self) -> String {
        format!("{}.mp4", self.stem)
    }
}

/// Temporary sibling for an artifact name: dotted so the watcher never sees
/// it, `.tmp` so a crash leaves nothing that looks like media.
fn temp_path(dir: &Path, final_name: &str) -> PathBuf {
    dir.join(format!(".{final_name}.tmp"))
}

async fn run_worker(
    config: StoreConfig,
    camera: CameraSnapshot,
    mut rx: mpsc::Receiver<WriterCommand>,
    events: mpsc::Sender<WriterEvent>,
    dropped: Arc<AtomicU64>,
) {
    let mut session: Option<OpenSession> = None;

    while let Some(command) = rx.recv().await {
        match command {
            WriterCommand::Open { started, motion } => {
                if session.is_some() {
                    warn!("session already open, discarding its buffered frames");
                }
                debug!(%started, "writer session opened");
                session = Some(OpenSession::new(&config, started, motion));
            }

            WriterCommand::Photo { index, frame } => {
                let Some(open) = session.as_ref() else {
                    warn!("photo command outside a session");
                    continue;
                };
                let dir = open.dir.clone();
                let name = open.photo_name(index);
                let meta = open.metadata(&camera, frame.resolution);
                let quality = config.jpeg_quality;
                let result = tokio::task::spawn_blocking(move || {
                    write_photo(&dir, &name, &frame, quality, &meta)
                })
                .await;
                report(&events, result).await;
            }

            WriterCommand::ClipFrame(frame) => {
                if let Some(open) = session.as_mut() {
                    if open.clip.len() >= config.max_clip_frames {
                        let n = dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        if n == 1 || n % 30 == 0 {
                            warn!(dropped = n, "clip buffer full, dropping frames");
                        }
                    } else {
                        open.clip.push(frame);
                    }
                }
            }

            WriterCommand::Close => {
                let Some(open) = session.take() else {
                    continue;
                };
                if open.clip.is_empty() {
                    // Photo sessions have nothing to finalize.
                    debug!("writer session closed");
                    continue;
                }
                let camera = camera.clone();
                let fps = config.clip_fps;
                let result =
                    tokio::task::spawn_blocking(move || write_clip(open, &camera, fps)).await;
                report(&events, result).await;
            }

            WriterCommand::Abort => {
                if let Some(open) = session.take() {
                    // Photos already renamed stay; the in-flight clip and any
                    // temporary are discarded so nothing partial is visible.
                    let tmp = temp_path(&open.dir, &open.clip_name());
                    let _ = fs::remove_file(&tmp);
                    info!(
                        buffered = open.clip.len(),
                        "capture session aborted, partial artifacts discarded"
                    );
                }
            }
        }
    }
    debug!("media writer stopped");
}

/// Forward a blocking write's outcome to the pipeline.
async fn report(
    events: &mpsc::Sender<WriterEvent>,
    result: std::result::Result<Result<MediaEvent>, tokio::task::JoinError>,
) {
    let event = match result {
        Ok(Ok(media)) => WriterEvent::Written(media),
        Ok(Err(e)) => WriterEvent::Failed(e.to_string()),
        Err(e) => WriterEvent::Failed(format!("writer task panicked: {e}")),
    };
    if let WriterEvent::Failed(msg) = &event {
        warn!("artifact write failed: {msg}");
    }
    let _ = events.send(event).await;
}

/// Encode and persist one photo: temporary name, then atomic rename.
fn write_photo(
    dir: &Path,
    name: &str,
    frame: &Frame,
    quality: u8,
    meta: &CaptureMetadata,
) -> Result<MediaEvent> {
    fs::create_dir_all(dir)
        .map_err(|e| Error::WriteFailure(format!("create {}: {e}", dir.display())))?;
    let bytes = photo::encode_photo(frame, quality, meta)?;

    let tmp = temp_path(dir, name);
    let final_path = dir.join(name);
    let written = fs::write(&tmp, &bytes)
        .and_then(|()| fs::rename(&tmp, &final_path))
        .map_err(|e| Error::WriteFailure(format!("persist {}: {e}", final_path.display())));
    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    info!(path = %final_path.display(), "photo written");
    Ok(MediaEvent {
        path: final_path,
        kind: MediaKind::Photo,
    })
}

/// Mux and persist the session clip: temporary name, then atomic rename.
fn write_clip(open: OpenSession, camera: &CameraSnapshot, fps: u32) -> Result<MediaEvent> {
    fs::create_dir_all(&open.dir)
        .map_err(|e| Error::WriteFailure(format!("create {}: {e}", open.dir.display())))?;

    let name = open.clip_name();
    let tmp = temp_path(&open.dir, &name);
    let final_path = open.dir.join(&name);
    let meta = open.metadata(camera, open.clip[0].resolution);

    let muxed = video::mux_clip(&open.clip, fps, &meta, &tmp).and_then(|()| {
        fs::rename(&tmp, &final_path)
            .map_err(|e| Error::WriteFailure(format!("rename {}: {e}", final_path.display())))
    });
    if let Err(e) = muxed {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }

    info!(path = %final_path.display(), frames = open.clip.len(), "clip written");
    Ok(MediaEvent {
        path: final_path,
        kind: MediaKind::Video,
    })
}
