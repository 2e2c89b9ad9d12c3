//! Capture metadata embedded into artifacts
//!
//! One JSON document per artifact, carried inside the artifact's own
//! container (JPEG comment segment, MP4 comment tag) so the viewer can show
//! capture conditions without a side-channel database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use perch_core::{BoundingBox, CameraKind, CameraTuning, Error, Resolution, Result};

/// The motion measurement that triggered the capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MotionSummary {
    pub score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub captured_at: DateTime<Utc>,
    pub camera_kind: CameraKind,
    pub camera_name: String,
    pub resolution: Resolution,
    pub tuning: CameraTuning,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motion: Option<MotionSummary>,
}

impl CaptureMetadata {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Encode(format!("metadata encode: {e}")))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Encode(format!("metadata decode: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_core::WhiteBalanceMode;

    fn sample() -> CaptureMetadata {
        CaptureMetadata {
            captured_at: "2026-08-08T06:30:00Z".parse().unwrap(),
            camera_kind: CameraKind::PiHq,
            camera_name: "imx477".to_string(),
            resolution: Resolution::new(1920, 1080),
            tuning: CameraTuning {
                white_balance: WhiteBalanceMode::Cloudy,
                exposure_us: Some(4000),
                gain: Some(2.0),
                ..CameraTuning::default()
            },
            motion: Some(MotionSummary {
                score: 0.12,
                region: Some(BoundingBox {
                    x: 100,
                    y: 200,
                    width: 300,
                    height: 250,
                }),
            }),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let meta = sample();
        let json = meta.to_json().unwrap();
        assert_eq!(CaptureMetadata::from_json(&json).unwrap(), meta);
    }

    #[test]
    fn json_uses_stable_field_names() {
        let json = sample().to_json().unwrap();
        // The viewer parses these names; they are part of the contract.
        assert!(json.contains("\"captured_at\""));
        assert!(json.contains("\"camera_kind\":\"pi_hq\""));
        assert!(json.contains("\"white_balance\":\"cloudy\""));
        assert!(json.contains("\"motion\""));
    }

    #[test]
    fn absent_motion_is_omitted() {
        let meta = CaptureMetadata {
            motion: None,
            ..sample()
        };
        let json = meta.to_json().unwrap();
        assert!(!json.contains("motion"));
        assert_eq!(CaptureMetadata::from_json(&json).unwrap().motion, None);
    }

    #[test]
    fn garbage_fails_with_encode_error() {
        let err = CaptureMetadata::from_json("not json").unwrap_err();
        assert!(matches!(err, Error::Encode(_)));
    }
}
