//! End-to-end pipeline tests: synthetic frames through the motion detector
//! and capture controller, no hardware.

use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::Utc;

use perch_capture::acquisition::{AcquisitionConfig, FrameStream};
use perch_capture::controller::{CaptureAction, CaptureController, State};
use perch_capture::motion::MotionDetector;
use perch_capture::source::{CameraSource, SyntheticConfig, SyntheticSource};
use perch_core::{
    CaptureMode, ControllerConfig, DetectorConfig, Error, Frame, PixelFormat, ReferenceStrategy,
    Resolution,
};

const W: u32 = 100;
const H: u32 = 100;

/// Flat gray 100x100 frame with a bright block at `(bx, by)`.
/// The 25x20 block covers 5% of the frame area.
fn block_frame(seq: u64, block: Option<(u32, u32)>) -> Frame {
    let res = Resolution::new(W, H);
    let mut data = vec![0x40u8; PixelFormat::Rgb24.frame_size(res)];
    if let Some((bx, by)) = block {
        for y in by..by + 20 {
            for x in bx..bx + 25 {
                let p = ((y * W + x) * 3) as usize;
                data[p] = 0xc0;
                data[p + 1] = 0xc0;
                data[p + 2] = 0xc0;
            }
        }
    }
    Frame::new(seq, Utc::now(), res, PixelFormat::Rgb24, Bytes::from(data))
}

fn detector_config(sensitivity: f32) -> DetectorConfig {
    DetectorConfig {
        sensitivity,
        delta_threshold: 25,
        downsample: 1,
        strategy: ReferenceStrategy::FrameDiff,
        min_aspect: 0.4,
        max_aspect: 2.5,
        cadence: 1,
    }
}

/// Sensitivity 0.1 with a moving block covering 5% of the frame: the move
/// changes 10% of pixels (old position plus new), which must open exactly
/// one capture session; a second move 200 ms later lands in cooldown.
#[test]
fn moving_block_opens_one_session_and_cooldown_suppresses_the_second() {
    let mut detector = MotionDetector::new(detector_config(0.1));
    let mut controller = CaptureController::new(ControllerConfig {
        mode: CaptureMode::Photo {
            count: 1,
            spacing: Duration::ZERO,
        },
        cooldown: Duration::from_secs(30),
        ..ControllerConfig::default()
    });

    let t0 = Instant::now();
    let mut opened = 0usize;
    let feed = [
        (0u64, Some((0u32, 0u32)), 0u64),  // seeds the reference
        (1, Some((0, 0)), 33),             // static: no motion
        (2, Some((50, 50)), 66),           // block moves: 10% changed
        (3, Some((50, 50)), 100),          // static again
        (4, Some((0, 0)), 266),            // second move, 200ms after the capture
        (5, Some((0, 0)), 300),
    ];
    for (seq, block, ms) in feed {
        let frame = block_frame(seq, block);
        let motion = detector.observe(&frame);
        let actions = controller.on_frame(t0 + Duration::from_millis(ms), motion.as_ref());
        opened += actions
            .iter()
            .filter(|a| matches!(a, CaptureAction::OpenSession { .. }))
            .count();
    }

    assert_eq!(opened, 1, "expected exactly one capture session");
    assert!(matches!(controller.state(), State::Cooldown { .. }));
}

/// A still scene below the sensitivity never leaves Idle.
#[test]
fn sub_threshold_motion_leaves_controller_idle() {
    // 5% block appearing changes 5% of pixels; sensitivity 0.2 ignores it.
    let mut detector = MotionDetector::new(detector_config(0.2));
    let mut controller = CaptureController::new(ControllerConfig::default());

    let t0 = Instant::now();
    let frames = [
        block_frame(0, None),
        block_frame(1, Some((10, 10))),
        block_frame(2, None),
        block_frame(3, Some((60, 60))),
    ];
    for (i, frame) in frames.iter().enumerate() {
        let motion = detector.observe(frame);
        let actions = controller.on_frame(t0 + Duration::from_millis(33 * i as u64), motion.as_ref());
        assert!(actions.is_empty());
    }
    assert_eq!(*controller.state(), State::Idle);
}

/// The synthetic source feeds the acquisition loop; when it runs out of
/// frames the stream surfaces the fatal disconnect, exactly once.
#[tokio::test(flavor = "multi_thread")]
async fn synthetic_source_drives_detection_then_disconnects() {
    let mut source = SyntheticSource::new(SyntheticConfig {
        resolution: Resolution::new(64, 64),
        fps: 120,
        frames: Some(12),
        block_size: 16,
        block_every: 4, // moves on frames 4 and 8
    });
    let rx = source.open().unwrap();
    let mut stream = FrameStream::new(
        rx,
        &AcquisitionConfig {
            fps: 120,
            max_retries: 2,
            backoff: Duration::from_millis(10),
        },
    );
    let mut detector = MotionDetector::new(DetectorConfig {
        downsample: 1,
        strategy: ReferenceStrategy::FrameDiff,
        // The synthetic block is square but sits in a corner; keep the
        // defaults for everything else.
        ..DetectorConfig::default()
    });

    let mut motion_frames = 0usize;
    let mut frames_seen = 0usize;
    let disconnect = loop {
        match stream.next().await {
            Ok(frame) => {
                frames_seen += 1;
                if detector.observe(&frame).is_some() {
                    motion_frames += 1;
                }
            }
            Err(err) => break err,
        }
    };

    assert_eq!(frames_seen, 12);
    // The block jumped twice after the seed frame.
    assert_eq!(motion_frames, 2);
    assert!(matches!(disconnect, Error::CameraDisconnected(_)));
}
