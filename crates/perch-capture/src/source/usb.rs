//! USB webcam source: v4l2-ctl tuning, ffmpeg rawvideo capture
//!
//! UVC devices take their tuning through V4L2 controls, applied best-effort
//! with `v4l2-ctl` before the capture process starts (controls vary wildly
//! between webcam models). Frames come from `ffmpeg -f v4l2` as raw RGB24 on
//! stdout.

use std::process::{Child, Command, Stdio};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use perch_core::{
    CameraConfig, CameraDescriptor, CameraTuning, Error, Frame, PixelFormat, Result,
    WhiteBalanceMode,
};

use super::{read_frames, CameraSource, SOURCE_CHANNEL_DEPTH};

pub struct UsbSource {
    descriptor: CameraDescriptor,
    config: CameraConfig,
    child: Option<Child>,
}

impl UsbSource {
    pub fn new(descriptor: CameraDescriptor, config: CameraConfig) -> Self {
        Self {
            descriptor,
            config,
            child: None,
        }
    }

    /// Map tuning onto V4L2 control assignments for `v4l2-ctl --set-ctrl`.
    /// Normalized values are scaled into the common UVC 0-255 control range.
    fn v4l2_controls(tuning: &CameraTuning, autofocus: bool) -> Vec<String> {
        let mut ctrls = Vec::new();
        match tuning.white_balance {
            WhiteBalanceMode::Auto => ctrls.push("white_balance_automatic=1".to_string()),
            mode => {
                ctrls.push("white_balance_automatic=0".to_string());
                ctrls.push(format!(
                    "white_balance_temperature={}",
                    mode.color_temperature_k()
                ));
            }
        }
        if let Some(us) = tuning.exposure_us {
            // auto_exposure=1 is manual mode for UVC; the absolute control
            // counts in 100 microsecond units.
            ctrls.push("auto_exposure=1".to_string());
            ctrls.push(format!("exposure_time_absolute={}", (us / 100).max(1)));
        }
        if let Some(gain) = tuning.gain {
            ctrls.push(format!("gain={}", gain.round() as i32));
        }
        if let Some(brightness) = tuning.brightness {
            ctrls.push(format!(
                "brightness={}",
                ((brightness + 1.0) * 127.5).round() as i32
            ));
        }
        if let Some(contrast) = tuning.contrast {
            ctrls.push(format!("contrast={}", (contrast * 127.5).round() as i32));
        }
        if let Some(saturation) = tuning.saturation {
            ctrls.push(format!("saturation={}", (saturation * 127.5).round() as i32));
        }
        if let Some(sharpness) = tuning.sharpness {
            ctrls.push(format!("sharpness={}", (sharpness * 127.5).round() as i32));
        }
        if autofocus {
            ctrls.push("focus_automatic_continuous=1".to_string());
        }
        ctrls
    }

    /// Apply controls one at a time so an unsupported control on a given
    /// webcam model doesn't take the rest down with it.
    fn apply_tuning(&self) {
        let ctrls = Self::v4l2_controls(&self.config.tuning, self.descriptor.autofocus);
        for ctrl in &ctrls {
            let status = Command::new("v4l2-ctl")
                .arg("-d")
                .arg(&self.descriptor.path)
                .arg(format!("--set-ctrl={ctrl}"))
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            match status {
                Ok(s) if s.success() => debug!(%ctrl, "applied v4l2 control"),
                _ => warn!(%ctrl, "v4l2 control not applied (unsupported on this device?)"),
            }
        }
    }

    fn build_args(descriptor: &CameraDescriptor, config: &CameraConfig) -> Vec<String> {
        vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "v4l2".to_string(),
            "-framerate".to_string(),
            config.fps.to_string(),
            "-video_size".to_string(),
            format!(
                "{}x{}",
                config.resolution.width, config.resolution.height
            ),
            "-i".to_string(),
            descriptor.path.to_string_lossy().into_owned(),
            "-f".to_string(),
            "rawvideo".to_string(),
            "-pix_fmt".to_string(),
            "rgb24".to_string(),
            "-".to_string(),
        ]
    }
}

impl CameraSource for UsbSource {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn open(&mut self) -> Result<mpsc::Receiver<Frame>> {
        self.apply_tuning();

        let args = Self::build_args(&self.descriptor, &self.config);
        info!(
            "starting ffmpeg v4l2 capture on {}: {} @ {}fps",
            self.descriptor.path.display(),
            self.config.resolution,
            self.config.fps
        );
        debug!(?args, "ffmpeg args");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::CameraDisconnected(format!("failed to spawn ffmpeg (is it installed?): {e}"))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::CameraDisconnected("no stdout from ffmpeg".into()))?;

        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_DEPTH);
        let resolution = self.config.resolution;
        tokio::task::spawn_blocking(move || {
            read_frames(stdout, tx, resolution, PixelFormat::Rgb24);
        });

        self.child = Some(child);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("stopping ffmpeg capture");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for UsbSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_core::Resolution;
    use std::path::PathBuf;

    #[test]
    fn default_tuning_fixes_white_balance_only() {
        let ctrls = UsbSource::v4l2_controls(&CameraTuning::default(), false);
        assert_eq!(
            ctrls,
            vec![
                "white_balance_automatic=0".to_string(),
                "white_balance_temperature=6500".to_string(),
            ]
        );
    }

    #[test]
    fn auto_white_balance_enables_the_auto_control() {
        let tuning = CameraTuning {
            white_balance: WhiteBalanceMode::Auto,
            ..CameraTuning::default()
        };
        let ctrls = UsbSource::v4l2_controls(&tuning, false);
        assert!(ctrls.contains(&"white_balance_automatic=1".to_string()));
        assert!(!ctrls.iter().any(|c| c.starts_with("white_balance_temperature")));
    }

    #[test]
    fn normalized_controls_scale_to_uvc_range() {
        let tuning = CameraTuning {
            exposure_us: Some(10_000),
            brightness: Some(0.0),
            contrast: Some(2.0),
            ..CameraTuning::default()
        };
        let ctrls = UsbSource::v4l2_controls(&tuning, true);
        assert!(ctrls.contains(&"exposure_time_absolute=100".to_string()));
        assert!(ctrls.contains(&"brightness=128".to_string()));
        assert!(ctrls.contains(&"contrast=255".to_string()));
        assert!(ctrls.contains(&"focus_automatic_continuous=1".to_string()));
    }

    #[test]
    fn capture_args_request_rgb24() {
        let descriptor = CameraDescriptor {
            kind: perch_core::CameraKind::UsbWebcam,
            path: PathBuf::from("/dev/video0"),
            name: "C922 Pro".to_string(),
            max_resolution: None,
            autofocus: true,
        };
        let config = CameraConfig {
            resolution: Resolution::new(1920, 1080),
            fps: 30,
            ..CameraConfig::default()
        };
        let args = UsbSource::build_args(&descriptor, &config);
        let joined = args.join(" ");
        assert!(joined.contains("-f v4l2"));
        assert!(joined.contains("-video_size 1920x1080"));
        assert!(joined.contains("-i /dev/video0"));
        assert!(joined.contains("-pix_fmt rgb24"));
    }
}
