//! Camera source abstraction and device enumeration
//!
//! Camera identity is explicit: the configured kind is matched against the
//! enumerated devices and the pipeline refuses to start on a miss. Falling
//! back to "whatever camera is available" is deliberately not supported.

use std::fs;
use std::io::Read;
use std::path::PathBuf;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use perch_core::{
    CameraConfig, CameraDescriptor, CameraKind, Error, Frame, MismatchWarning, PixelFormat,
    Resolution, Result,
};

mod pi_hq;
mod synthetic;
mod usb;

pub use pi_hq::PiHqSource;
pub use synthetic::{SyntheticConfig, SyntheticSource};
pub use usb::UsbSource;

/// Depth of the channel between a source's reader thread and the
/// acquisition loop. Small: stale frames are worthless for motion detection.
pub(crate) const SOURCE_CHANNEL_DEPTH: usize = 4;

/// A capture device yielding raw frames.
///
/// Implementations own the underlying device handle (a child process for the
/// hardware-backed sources) and release it on `stop` and on drop.
pub trait CameraSource: Send {
    fn descriptor(&self) -> &CameraDescriptor;

    /// Begin streaming. The sender side of the returned channel closes when
    /// the device stops producing, which the acquisition loop treats as a
    /// disconnect.
    fn open(&mut self) -> Result<mpsc::Receiver<Frame>>;

    fn stop(&mut self);
}

/// Scan `/dev/video*` for connected capture devices, in node order.
/// Never fails; returns an empty list when nothing is connected.
pub fn enumerate() -> Vec<CameraDescriptor> {
    let mut cameras = Vec::new();
    for index in 0..32u32 {
        let path = PathBuf::from(format!("/dev/video{index}"));
        if !path.exists() {
            continue;
        }
        let name = sysfs_name(index).unwrap_or_else(|| format!("video{index}"));
        let kind = classify(index, &name);
        debug!(path = %path.display(), %name, %kind, "enumerated capture device");
        cameras.push(CameraDescriptor {
            kind,
            path,
            name,
            max_resolution: None,
            autofocus: kind == CameraKind::UsbWebcam,
        });
    }
    cameras
}

/// Driver name for a node, from sysfs.
fn sysfs_name(index: u32) -> Option<String> {
    fs::read_to_string(format!("/sys/class/video4linux/video{index}/name"))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Classify a video node by its driver name and index. libcamera exposes CSI
/// sensors at `/dev/video10` and above on the Pi; UVC webcams take the low
/// nodes.
pub(crate) fn classify(index: u32, name: &str) -> CameraKind {
    let lower = name.to_lowercase();
    const CSI_MARKERS: [&str; 7] = ["imx", "ov5647", "arducam", "csi", "mipi", "unicam", "hq"];
    if CSI_MARKERS.iter().any(|m| lower.contains(m)) {
        return CameraKind::PiHq;
    }
    if index >= 10 {
        CameraKind::PiHq
    } else if index <= 3 {
        CameraKind::UsbWebcam
    } else {
        CameraKind::GenericV4l2
    }
}

/// Select the configured camera from an enumeration.
///
/// Returns the first matching descriptor, plus a [`MismatchWarning`] when
/// devices of other kinds are also present. A miss is
/// [`Error::CameraNotFound`] carrying the full listing.
pub fn select(
    cameras: &[CameraDescriptor],
    requested: CameraKind,
) -> Result<(CameraDescriptor, Option<MismatchWarning>)> {
    let others: Vec<CameraDescriptor> = cameras
        .iter()
        .filter(|c| c.kind != requested)
        .cloned()
        .collect();
    let warning = if others.is_empty() {
        None
    } else {
        Some(MismatchWarning {
            configured: requested,
            others,
        })
    };
    match cameras.iter().find(|c| c.kind == requested) {
        Some(cam) => Ok((cam.clone(), warning)),
        None => Err(Error::CameraNotFound {
            requested,
            available: cameras.to_vec(),
        }),
    }
}

/// Validate tuning, then open the family-specific source for `descriptor`.
/// Tuning errors are fatal here, before any capture work begins.
pub fn open_source(
    descriptor: &CameraDescriptor,
    config: &CameraConfig,
) -> Result<Box<dyn CameraSource>> {
    config.tuning.validate()?;
    let source: Box<dyn CameraSource> = match descriptor.kind {
        CameraKind::PiHq => Box::new(PiHqSource::new(descriptor.clone(), config.clone())),
        CameraKind::UsbWebcam | CameraKind::GenericV4l2 => {
            Box::new(UsbSource::new(descriptor.clone(), config.clone()))
        }
    };
    Ok(source)
}

/// Slice a capture process's stdout into exact frame-sized chunks and
/// forward them as [`Frame`]s. Runs on a blocking thread; exits when the
/// stream ends or the receiver is dropped.
pub(crate) fn read_frames<R: Read>(
    mut reader: R,
    tx: mpsc::Sender<Frame>,
    resolution: Resolution,
    format: PixelFormat,
) {
    let frame_size = format.frame_size(resolution);
    let mut buf = vec![0u8; frame_size];
    let mut seq = 0u64;
    loop {
        match reader.read_exact(&mut buf) {
            Ok(()) => {
                let frame = Frame::new(
                    seq,
                    Utc::now(),
                    resolution,
                    format,
                    Bytes::copy_from_slice(&buf),
                );
                if tx.blocking_send(frame).is_err() {
                    info!("frame receiver dropped, stopping reader");
                    break;
                }
                seq += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                info!("video stream ended after {seq} frames");
                break;
            }
            Err(e) => {
                error!("error reading video stream: {e}");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn descriptor(kind: CameraKind, path: &str, name: &str) -> CameraDescriptor {
        CameraDescriptor {
            kind,
            path: PathBuf::from(path),
            name: name.to_string(),
            max_resolution: None,
            autofocus: false,
        }
    }

    #[test]
    fn classify_by_node_number() {
        assert_eq!(classify(0, "HD Webcam"), CameraKind::UsbWebcam);
        assert_eq!(classify(3, "video3"), CameraKind::UsbWebcam);
        assert_eq!(classify(5, "video5"), CameraKind::GenericV4l2);
        assert_eq!(classify(10, "video10"), CameraKind::PiHq);
        assert_eq!(classify(14, "video14"), CameraKind::PiHq);
    }

    #[test]
    fn classify_by_sensor_name_wins_over_index() {
        assert_eq!(classify(0, "unicam: imx477"), CameraKind::PiHq);
        assert_eq!(classify(2, "Arducam 64MP"), CameraKind::PiHq);
        assert_eq!(classify(1, "mipi-csi2 sensor"), CameraKind::PiHq);
    }

    #[test]
    fn select_matching_camera() {
        let cams = vec![
            descriptor(CameraKind::UsbWebcam, "/dev/video0", "C922 Pro"),
            descriptor(CameraKind::PiHq, "/dev/video10", "imx477"),
        ];
        let (chosen, warning) = select(&cams, CameraKind::PiHq).unwrap();
        assert_eq!(chosen.name, "imx477");
        // The unconfigured USB camera produces a mismatch warning.
        let warning = warning.unwrap();
        assert_eq!(warning.others.len(), 1);
        assert_eq!(warning.others[0].kind, CameraKind::UsbWebcam);
    }

    #[test]
    fn select_without_other_kinds_has_no_warning() {
        let cams = vec![descriptor(CameraKind::PiHq, "/dev/video10", "imx477")];
        let (_, warning) = select(&cams, CameraKind::PiHq).unwrap();
        assert!(warning.is_none());
    }

    #[test]
    fn requesting_usb_with_only_pi_hq_fails_with_listing() {
        let cams = vec![descriptor(CameraKind::PiHq, "/dev/video10", "imx477")];
        let err = select(&cams, CameraKind::UsbWebcam).unwrap_err();
        match err {
            Error::CameraNotFound {
                requested,
                available,
            } => {
                assert_eq!(requested, CameraKind::UsbWebcam);
                assert_eq!(available.len(), 1);
                assert_eq!(available[0].name, "imx477");
            }
            other => panic!("expected CameraNotFound, got {other:?}"),
        }
    }

    #[test]
    fn select_from_empty_enumeration() {
        let err = select(&[], CameraKind::PiHq).unwrap_err();
        match err {
            Error::CameraNotFound { available, .. } => assert!(available.is_empty()),
            other => panic!("expected CameraNotFound, got {other:?}"),
        }
    }

    #[test]
    fn first_match_wins_in_node_order() {
        let cams = vec![
            descriptor(CameraKind::UsbWebcam, "/dev/video0", "first"),
            descriptor(CameraKind::UsbWebcam, "/dev/video1", "second"),
        ];
        let (chosen, _) = select(&cams, CameraKind::UsbWebcam).unwrap();
        assert_eq!(chosen.name, "first");
    }

    #[test]
    fn reader_slices_exact_frames() {
        let resolution = Resolution::new(4, 2);
        let frame_size = PixelFormat::Rgb24.frame_size(resolution);
        // Two frames and a truncated tail that must be discarded.
        let mut stream = Vec::new();
        stream.extend(std::iter::repeat(1u8).take(frame_size));
        stream.extend(std::iter::repeat(2u8).take(frame_size));
        stream.extend(std::iter::repeat(3u8).take(frame_size / 2));

        let (tx, mut rx) = mpsc::channel(8);
        read_frames(
            std::io::Cursor::new(stream),
            tx,
            resolution,
            PixelFormat::Rgb24,
        );

        let first = rx.try_recv().unwrap();
        assert_eq!(first.seq, 0);
        assert_eq!(first.data.len(), frame_size);
        assert!(first.data.iter().all(|&b| b == 1));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.seq, 1);
        assert!(second.data.iter().all(|&b| b == 2));
        assert!(rx.try_recv().is_err());
    }
}
