//! Perch camera daemon
//!
//! Watches a camera, scores inter-frame motion, and persists photo/video
//! evidence with embedded metadata under a date-partitioned output tree,
//! publishing a notification for every artifact that becomes visible.
//!
//! ## Usage
//!
//! ```bash
//! # Required: which camera family to use (no fallback on mismatch)
//! export PERCH_CAMERA=pi_hq          # or usb_webcam
//!
//! # Run against real hardware
//! perch-camera
//!
//! # Run without hardware (synthetic moving-block source)
//! perch-camera --test-source
//! ```
//!
//! Configuration comes from `PERCH_*` environment variables; see
//! [`Config::from_env`] for the full set.

use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

use tracing::{debug, error, info, warn};

use perch_capture::acquisition::{AcquisitionConfig, FrameStream};
use perch_capture::controller::{CaptureAction, CaptureController};
use perch_capture::motion::MotionDetector;
use perch_capture::source::{self, CameraSource, SyntheticConfig, SyntheticSource};
use perch_core::{
    CameraConfig, CameraKind, CameraTuning, CaptureMode, ControllerConfig, DetectorConfig,
    Error, MotionEvent, Resolution, StoreConfig, WhiteBalanceMode,
};
use perch_store::{CameraSnapshot, MediaWriter, MotionSummary, OutputWatcher, WriterCommand, WriterEvent};

/// Daemon configuration from environment variables and flags.
struct Config {
    camera: CameraConfig,
    detector: DetectorConfig,
    controller: ControllerConfig,
    store: StoreConfig,
    /// Use the synthetic source instead of real hardware.
    test_source: bool,
}

impl Config {
    fn from_env() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let test_source = args.iter().any(|arg| arg == "--test-source");

        let kind = match std::env::var("PERCH_CAMERA") {
            Ok(value) => CameraKind::from_str(&value)?,
            Err(_) if test_source => CameraKind::GenericV4l2,
            Err(_) => bail!("PERCH_CAMERA not set (usb_webcam, pi_hq, or generic_v4l2)"),
        };

        let awb_code: u8 = env_parse("PERCH_AWB", 7);
        let white_balance = WhiteBalanceMode::from_code(awb_code)
            .ok_or_else(|| anyhow!("PERCH_AWB must be a mode code 1-7, got {awb_code}"))?;

        let tuning = CameraTuning {
            white_balance,
            exposure_us: env_parse_opt("PERCH_EXPOSURE_US"),
            gain: env_parse_opt("PERCH_GAIN"),
            brightness: env_parse_opt("PERCH_BRIGHTNESS"),
            contrast: env_parse_opt("PERCH_CONTRAST"),
            saturation: env_parse_opt("PERCH_SATURATION"),
            sharpness: env_parse_opt("PERCH_SHARPNESS"),
        };

        let fps: u32 = env_parse("PERCH_FPS", 30);
        let camera = CameraConfig {
            kind,
            resolution: Resolution::new(
                env_parse("PERCH_WIDTH", 1920),
                env_parse("PERCH_HEIGHT", 1080),
            ),
            fps,
            tuning,
        };

        let detector = DetectorConfig {
            sensitivity: env_parse("PERCH_SENSITIVITY", 0.02),
            ..DetectorConfig::default()
        };

        let mode = match std::env::var("PERCH_MODE").as_deref() {
            Ok("video") => CaptureMode::Video,
            Ok("photo") | Err(_) => CaptureMode::Photo {
                count: env_parse("PERCH_PHOTOS", 3),
                spacing: Duration::from_secs(env_parse("PERCH_PHOTO_SPACING_SECS", 2)),
            },
            Ok(other) => bail!("PERCH_MODE must be 'photo' or 'video', got '{other}'"),
        };
        let controller = ControllerConfig {
            mode,
            min_duration: Duration::from_secs(env_parse("PERCH_MIN_CLIP_SECS", 5)),
            max_duration: Duration::from_secs(env_parse("PERCH_MAX_CLIP_SECS", 30)),
            quiet_period: Duration::from_secs(env_parse("PERCH_QUIET_SECS", 2)),
            cooldown: Duration::from_secs(env_parse("PERCH_COOLDOWN_SECS", 30)),
        };

        let store = StoreConfig {
            output_root: std::env::var("PERCH_OUTPUT_DIR")
                .unwrap_or_else(|_| "media".to_string())
                .into(),
            clip_fps: fps,
            poll_interval: Duration::from_millis(env_parse("PERCH_POLL_MS", 500)),
            ..StoreConfig::default()
        };

        Ok(Self {
            camera,
            detector,
            controller,
            store,
            test_source,
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_parse_opt<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env()?;

    info!("Perch camera starting");
    info!(
        "  Camera: {} at {} @ {}fps",
        config.camera.kind, config.camera.resolution, config.camera.fps
    );
    info!(
        "  Tuning: awb {} (code {})",
        config.camera.tuning.white_balance,
        config.camera.tuning.white_balance.code()
    );
    info!("  Sensitivity: {}", config.detector.sensitivity);
    match &config.controller.mode {
        CaptureMode::Photo { count, spacing } => {
            info!("  Mode: photo burst of {count}, {:?} apart", spacing)
        }
        CaptureMode::Video => info!(
            "  Mode: video, {:?}-{:?} per clip",
            config.controller.min_duration, config.controller.max_duration
        ),
    }
    info!("  Cooldown: {:?}", config.controller.cooldown);
    info!("  Output: {}", config.store.output_root.display());
    info!("  Test source: {}", config.test_source);

    // ── Camera selection ───────────────────────────────────────────────
    // Identity is explicit: a configured camera that is absent terminates
    // the process with the device listing, never a silent fallback.
    let mut camera: Box<dyn CameraSource> = if config.test_source {
        Box::new(SyntheticSource::new(SyntheticConfig {
            resolution: config.camera.resolution,
            fps: config.camera.fps,
            ..SyntheticConfig::default()
        }))
    } else {
        let cameras = source::enumerate();
        info!("Enumerated {} capture device(s)", cameras.len());
        for cam in &cameras {
            info!("  {cam}");
        }
        let (descriptor, mismatch) = match source::select(&cameras, config.camera.kind) {
            Ok(selection) => selection,
            Err(e) => {
                error!("{e}");
                if let Error::CameraNotFound { available, .. } = &e {
                    if available.is_empty() {
                        error!("no capture devices connected");
                    }
                    for cam in available {
                        error!("  available: {cam}");
                    }
                }
                std::process::exit(1);
            }
        };
        if let Some(mismatch) = mismatch {
            warn!("{mismatch}");
        }
        info!("Selected camera: {descriptor}");
        source::open_source(&descriptor, &config.camera)
            .map_err(|e| {
                error!("{e}");
                e
            })
            .context("camera startup failed")?
    };

    let snapshot = CameraSnapshot {
        kind: camera.descriptor().kind,
        name: camera.descriptor().name.clone(),
        tuning: config.camera.tuning.clone(),
    };

    // ── Persistence and notification ───────────────────────────────────
    let (writer, mut writer_events) = MediaWriter::start(config.store.clone(), snapshot);
    let mut media_events =
        OutputWatcher::start(config.store.output_root.clone(), config.store.poll_interval);
    tokio::spawn(async move {
        // The external push channel attaches here; the daemon's own
        // contract ends at publishing the event.
        while let Some(event) = media_events.recv().await {
            info!(kind = %event.kind, path = %event.path.display(), "new media available");
        }
    });

    // ── Capture pipeline ───────────────────────────────────────────────
    let rx = camera.open().context("failed to open camera stream")?;
    let mut frames = FrameStream::new(
        rx,
        &AcquisitionConfig {
            fps: config.camera.fps,
            ..AcquisitionConfig::default()
        },
    );
    let mut detector = MotionDetector::new(config.detector.clone());
    let mut controller = CaptureController::new(config.controller.clone());
    let cadence = config.detector.cadence.max(1) as u64;

    let mut frames_seen = 0u64;
    let mut motion_events = 0u64;
    let mut sessions = 0u64;
    let mut write_failures = 0u64;
    let mut last_stats = Instant::now();

    let fatal: Error = loop {
        tokio::select! {
            frame = frames.next() => {
                let frame = match frame {
                    Ok(frame) => frame,
                    Err(e) => break e,
                };
                frames_seen += 1;

                // Motion is evaluated every Nth frame to bound CPU; every
                // frame still reaches the controller so clips stay smooth.
                let motion: Option<MotionEvent> = if frame.seq % cadence == 0 {
                    detector.observe(&frame)
                } else {
                    None
                };
                if motion.is_some() {
                    motion_events += 1;
                }

                for action in controller.on_frame(Instant::now(), motion.as_ref()) {
                    match action {
                        CaptureAction::OpenSession { started, trigger_score: _ } => {
                            sessions += 1;
                            let summary = motion.as_ref().map(|m| MotionSummary {
                                score: m.score,
                                region: m.region,
                            });
                            writer.send(WriterCommand::Open { started, motion: summary }).await;
                        }
                        CaptureAction::CapturePhoto { index } => {
                            writer.send(WriterCommand::Photo { index, frame: frame.clone() }).await;
                        }
                        CaptureAction::AppendClipFrame => {
                            writer.push_clip_frame(frame.clone());
                        }
                        CaptureAction::CloseSession => {
                            writer.send(WriterCommand::Close).await;
                        }
                        CaptureAction::AbortSession => {
                            writer.send(WriterCommand::Abort).await;
                        }
                    }
                }

                if last_stats.elapsed() >= Duration::from_secs(5) {
                    info!(
                        "Stats: frames={} motion={} sessions={} write_failures={} dropped={}",
                        frames_seen, motion_events, sessions, write_failures,
                        writer.dropped_frames(),
                    );
                    last_stats = Instant::now();
                }
            }

            Some(event) = writer_events.recv() => {
                match event {
                    WriterEvent::Written(media) => {
                        debug!(kind = %media.kind, path = %media.path.display(), "artifact persisted");
                    }
                    WriterEvent::Failed(msg) => {
                        write_failures += 1;
                        warn!("write failure ({write_failures} total): {msg}");
                        for action in controller.on_write_failure(Instant::now()) {
                            if action == CaptureAction::AbortSession {
                                writer.send(WriterCommand::Abort).await;
                            }
                        }
                    }
                }
            }
        }
    };

    // Sustained failure: halt the pipeline once, release the camera, and
    // leave restart policy to the supervisor.
    error!("{fatal}");
    camera.stop();
    info!(
        "Pipeline halted after {} frames, {} motion events, {} sessions",
        frames_seen, motion_events, sessions
    );
    Err(fatal.into())
}
