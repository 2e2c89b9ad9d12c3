//! Pi HQ camera source backed by libcamera-vid
//!
//! Spawns `libcamera-vid` emitting raw YUV420 frames on stdout. Tuning maps
//! onto libcamera's control flags, so white balance, exposure, and the image
//! controls are applied by the ISP before frames ever reach this process.

use std::process::{Child, Command, Stdio};

use tokio::sync::mpsc;
use tracing::{debug, info};

use perch_core::{CameraConfig, CameraDescriptor, Error, Frame, PixelFormat, Result};

use super::{read_frames, CameraSource, SOURCE_CHANNEL_DEPTH};

pub struct PiHqSource {
    descriptor: CameraDescriptor,
    config: CameraConfig,
    child: Option<Child>,
}

impl PiHqSource {
    pub fn new(descriptor: CameraDescriptor, config: CameraConfig) -> Self {
        Self {
            descriptor,
            config,
            child: None,
        }
    }

    /// libcamera-vid argument list for the configured geometry and tuning.
    fn build_args(config: &CameraConfig) -> Vec<String> {
        let mut args = vec![
            "-t".to_string(),
            "0".to_string(), // run until killed
            "--width".to_string(),
            config.resolution.width.to_string(),
            "--height".to_string(),
            config.resolution.height.to_string(),
            "--framerate".to_string(),
            config.fps.to_string(),
            "--codec".to_string(),
            "yuv420".to_string(),
            "-o".to_string(),
            "-".to_string(),
            "--flush".to_string(),
            "--nopreview".to_string(),
        ];

        let tuning = &config.tuning;
        args.push("--awb".into());
        args.push(tuning.white_balance.as_str().into());
        if let Some(us) = tuning.exposure_us {
            args.push("--shutter".into());
            args.push(us.to_string());
        }
        if let Some(gain) = tuning.gain {
            args.push("--gain".into());
            args.push(gain.to_string());
        }
        if let Some(brightness) = tuning.brightness {
            args.push("--brightness".into());
            args.push(brightness.to_string());
        }
        if let Some(contrast) = tuning.contrast {
            args.push("--contrast".into());
            args.push(contrast.to_string());
        }
        if let Some(saturation) = tuning.saturation {
            args.push("--saturation".into());
            args.push(saturation.to_string());
        }
        if let Some(sharpness) = tuning.sharpness {
            args.push("--sharpness".into());
            args.push(sharpness.to_string());
        }
        args
    }
}

impl CameraSource for PiHqSource {
    fn descriptor(&self) -> &CameraDescriptor {
        &self.descriptor
    }

    fn open(&mut self) -> Result<mpsc::Receiver<Frame>> {
        let args = Self::build_args(&self.config);
        info!(
            "starting libcamera-vid: {} @ {}fps, awb {}",
            self.config.resolution, self.config.fps, self.config.tuning.white_balance
        );
        debug!(?args, "libcamera-vid args");

        let mut child = Command::new("libcamera-vid")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                Error::CameraDisconnected(format!(
                    "failed to spawn libcamera-vid (is it installed?): {e}"
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::CameraDisconnected("no stdout from libcamera-vid".into()))?;

        let (tx, rx) = mpsc::channel(SOURCE_CHANNEL_DEPTH);
        let resolution = self.config.resolution;
        tokio::task::spawn_blocking(move || {
            read_frames(stdout, tx, resolution, PixelFormat::Yuv420);
        });

        self.child = Some(child);
        Ok(rx)
    }

    fn stop(&mut self) {
        if let Some(mut child) = self.child.take() {
            info!("stopping libcamera-vid");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl Drop for PiHqSource {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_core::{CameraTuning, Resolution, WhiteBalanceMode};

    fn config(tuning: CameraTuning) -> CameraConfig {
        CameraConfig {
            resolution: Resolution::new(1280, 720),
            fps: 25,
            tuning,
            ..CameraConfig::default()
        }
    }

    #[test]
    fn default_args_request_raw_yuv() {
        let args = PiHqSource::build_args(&config(CameraTuning::default()));
        let joined = args.join(" ");
        assert!(joined.contains("--codec yuv420"));
        assert!(joined.contains("--width 1280"));
        assert!(joined.contains("--height 720"));
        assert!(joined.contains("--framerate 25"));
        assert!(joined.contains("--awb cloudy"));
        assert!(joined.contains("--nopreview"));
        // No optional controls unless configured.
        assert!(!joined.contains("--shutter"));
        assert!(!joined.contains("--gain"));
    }

    #[test]
    fn tuning_maps_to_control_flags() {
        let tuning = CameraTuning {
            white_balance: WhiteBalanceMode::Daylight,
            exposure_us: Some(8000),
            gain: Some(2.0),
            brightness: Some(0.1),
            contrast: Some(1.2),
            saturation: Some(0.9),
            sharpness: Some(1.5),
        };
        let args = PiHqSource::build_args(&config(tuning));
        let joined = args.join(" ");
        assert!(joined.contains("--awb daylight"));
        assert!(joined.contains("--shutter 8000"));
        assert!(joined.contains("--gain 2"));
        assert!(joined.contains("--brightness 0.1"));
        assert!(joined.contains("--contrast 1.2"));
        assert!(joined.contains("--saturation 0.9"));
        assert!(joined.contains("--sharpness 1.5"));
    }
}
