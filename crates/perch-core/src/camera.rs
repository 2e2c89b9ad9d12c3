//! Camera identity and device tuning

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::{Error, Resolution, Result};

/// Camera device families with distinct capture backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraKind {
    /// UVC webcam on a low-numbered V4L2 node.
    UsbWebcam,
    /// Raspberry Pi CSI camera exposed through libcamera.
    PiHq,
    /// Anything else that speaks V4L2.
    GenericV4l2,
}

impl CameraKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraKind::UsbWebcam => "usb_webcam",
            CameraKind::PiHq => "pi_hq",
            CameraKind::GenericV4l2 => "generic_v4l2",
        }
    }
}

impl fmt::Display for CameraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CameraKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "usb_webcam" => Ok(CameraKind::UsbWebcam),
            "pi_hq" => Ok(CameraKind::PiHq),
            "generic_v4l2" => Ok(CameraKind::GenericV4l2),
            other => Err(Error::Config(format!(
                "unknown camera type '{other}' (expected usb_webcam, pi_hq, or generic_v4l2)"
            ))),
        }
    }
}

/// One enumerated capture device. Immutable once selected; a fresh
/// enumeration produces fresh descriptors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    pub kind: CameraKind,
    /// Device node, e.g. `/dev/video0`.
    pub path: PathBuf,
    /// Human-readable name from the driver.
    pub name: String,
    /// Largest capture resolution, when the driver reports one.
    pub max_resolution: Option<Resolution>,
    /// Whether the device exposes an autofocus control.
    pub autofocus: bool,
}

impl fmt::Display for CameraDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (type: {}, path: {})",
            self.name,
            self.kind,
            self.path.display()
        )?;
        if let Some(res) = self.max_resolution {
            write!(f, " up to {res}")?;
        }
        Ok(())
    }
}

/// White-balance presets, identified by the integer codes the original
/// camera stack uses (1-7). The default is cloudy: an outdoor feeder camera
/// mostly shoots under overcast sky.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WhiteBalanceMode {
    Auto,
    Incandescent,
    Tungsten,
    Fluorescent,
    Indoor,
    Daylight,
    Cloudy,
}

impl WhiteBalanceMode {
    /// Mode for an integer code, 1-7.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(WhiteBalanceMode::Auto),
            2 => Some(WhiteBalanceMode::Incandescent),
            3 => Some(WhiteBalanceMode::Tungsten),
            4 => Some(WhiteBalanceMode::Fluorescent),
            5 => Some(WhiteBalanceMode::Indoor),
            6 => Some(WhiteBalanceMode::Daylight),
            7 => Some(WhiteBalanceMode::Cloudy),
            _ => None,
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            WhiteBalanceMode::Auto => 1,
            WhiteBalanceMode::Incandescent => 2,
            WhiteBalanceMode::Tungsten => 3,
            WhiteBalanceMode::Fluorescent => 4,
            WhiteBalanceMode::Indoor => 5,
            WhiteBalanceMode::Daylight => 6,
            WhiteBalanceMode::Cloudy => 7,
        }
    }

    /// Preset name as libcamera spells it (`--awb <name>`).
    pub fn as_str(&self) -> &'static str {
        match self {
            WhiteBalanceMode::Auto => "auto",
            WhiteBalanceMode::Incandescent => "incandescent",
            WhiteBalanceMode::Tungsten => "tungsten",
            WhiteBalanceMode::Fluorescent => "fluorescent",
            WhiteBalanceMode::Indoor => "indoor",
            WhiteBalanceMode::Daylight => "daylight",
            WhiteBalanceMode::Cloudy => "cloudy",
        }
    }

    /// Approximate correlated color temperature for V4L2 devices that take
    /// a Kelvin value instead of a preset.
    pub fn color_temperature_k(&self) -> u32 {
        match self {
            WhiteBalanceMode::Auto => 0,
            WhiteBalanceMode::Incandescent => 2800,
            WhiteBalanceMode::Tungsten => 3200,
            WhiteBalanceMode::Indoor => 3500,
            WhiteBalanceMode::Fluorescent => 4000,
            WhiteBalanceMode::Daylight => 5500,
            WhiteBalanceMode::Cloudy => 6500,
        }
    }
}

impl Default for WhiteBalanceMode {
    fn default() -> Self {
        WhiteBalanceMode::Cloudy
    }
}

impl fmt::Display for WhiteBalanceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Device tuning applied when the camera is opened.
///
/// Every optional control is bounded; [`CameraTuning::validate`] rejects
/// out-of-range values instead of clamping so a misconfigured deployment
/// fails visibly at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraTuning {
    pub white_balance: WhiteBalanceMode,
    /// Shutter time in microseconds. 100 µs to 10 s.
    pub exposure_us: Option<u32>,
    /// Analog gain, 1.0 to 16.0.
    pub gain: Option<f32>,
    /// -1.0 (black) to 1.0 (white).
    pub brightness: Option<f32>,
    /// 0.0 (flat) to 2.0; 1.0 is neutral.
    pub contrast: Option<f32>,
    /// 0.0 (grayscale) to 2.0; 1.0 is neutral.
    pub saturation: Option<f32>,
    /// 0.0 (none) to 2.0; 1.0 is neutral.
    pub sharpness: Option<f32>,
}

impl Default for CameraTuning {
    fn default() -> Self {
        Self {
            white_balance: WhiteBalanceMode::default(),
            exposure_us: None,
            gain: None,
            brightness: None,
            contrast: None,
            saturation: None,
            sharpness: None,
        }
    }
}

impl CameraTuning {
    pub const EXPOSURE_RANGE_US: (u32, u32) = (100, 10_000_000);
    pub const GAIN_RANGE: (f32, f32) = (1.0, 16.0);
    pub const BRIGHTNESS_RANGE: (f32, f32) = (-1.0, 1.0);
    pub const LEVEL_RANGE: (f32, f32) = (0.0, 2.0);

    /// Reject any out-of-range control.
    pub fn validate(&self) -> Result<()> {
        if let Some(us) = self.exposure_us {
            let (lo, hi) = Self::EXPOSURE_RANGE_US;
            if !(lo..=hi).contains(&us) {
                return Err(Error::InvalidTuning(format!(
                    "exposure {us}us out of range [{lo}, {hi}]"
                )));
            }
        }
        check_range("gain", self.gain, Self::GAIN_RANGE)?;
        check_range("brightness", self.brightness, Self::BRIGHTNESS_RANGE)?;
        check_range("contrast", self.contrast, Self::LEVEL_RANGE)?;
        check_range("saturation", self.saturation, Self::LEVEL_RANGE)?;
        check_range("sharpness", self.sharpness, Self::LEVEL_RANGE)?;
        Ok(())
    }
}

fn check_range(name: &str, value: Option<f32>, (lo, hi): (f32, f32)) -> Result<()> {
    match value {
        Some(v) if !(lo..=hi).contains(&v) => Err(Error::InvalidTuning(format!(
            "{name} {v} out of range [{lo}, {hi}]"
        ))),
        _ => Ok(()),
    }
}
