//! Runtime frame types delivered by a tracking source.

use std::collections::HashMap;

use nalgebra::{Matrix3, Matrix4, Vector3};
use photocap_common::security::validation::validate_dimensions;
use serde::{Deserialize, Serialize};

use crate::error::ExportError;

/// Pixel dimensions of a camera image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// An RGB8 camera image.
#[derive(Clone, Serialize, Deserialize)]
pub struct ColorImage {
    pub width: u32,
    pub height: u32,
    /// Interleaved RGB pixel data, row-major
    pub data: Vec<u8>,
}

/// A single-channel depth map in metres.
#[derive(Clone, Serialize, Deserialize)]
pub struct DepthMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

/// A single-channel depth confidence map (0 low, 1 medium, 2 high).
#[derive(Clone, Serialize, Deserialize)]
pub struct ConfidenceMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

fn check_len(kind: &str, width: u32, height: u32, len: usize, channels: usize) -> Result<(), ExportError> {
    validate_dimensions(width, height)
        .map_err(|e| ExportError::InvalidBuffer(format!("{} buffer: {}", kind, e)))?;
    let expected = width as usize * height as usize * channels;
    if len != expected {
        return Err(ExportError::InvalidBuffer(format!(
            "{} buffer has {} values, expected {} for {}x{}",
            kind, len, expected, width, height
        )));
    }
    Ok(())
}

impl ColorImage {
    pub fn validate(&self) -> Result<(), ExportError> {
        check_len("color", self.width, self.height, self.data.len(), 3)
    }
}

impl DepthMap {
    pub fn validate(&self) -> Result<(), ExportError> {
        check_len("depth", self.width, self.height, self.data.len(), 1)
    }
}

impl ConfidenceMap {
    pub fn validate(&self) -> Result<(), ExportError> {
        check_len("confidence", self.width, self.height, self.data.len(), 1)
    }
}

/// Tracker state for a frame. Only `Normal` frames are considered for admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackingState {
    #[default]
    Normal,
    Limited,
    NotAvailable,
}

/// Orientation of the display relative to the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisplayOrientation {
    #[default]
    Portrait,
    PortraitUpsideDown,
    LandscapeLeft,
    LandscapeRight,
}

impl DisplayOrientation {
    /// Rotation from the sensor frame to the display frame, in degrees.
    pub fn camera_to_display_rotation(&self) -> f32 {
        match self {
            DisplayOrientation::Portrait => 90.0,
            DisplayOrientation::LandscapeLeft => 180.0,
            DisplayOrientation::PortraitUpsideDown => -90.0,
            DisplayOrientation::LandscapeRight => 0.0,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "portrait" => Some(Self::Portrait),
            "portrait_upside_down" => Some(Self::PortraitUpsideDown),
            "landscape_left" => Some(Self::LandscapeLeft),
            "landscape_right" => Some(Self::LandscapeRight),
            _ => None,
        }
    }
}

/// Exposure values reported with a frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExposureInfo {
    /// Exposure duration in seconds
    pub duration: f64,
    /// Exposure offset in EV
    pub offset: f32,
    pub grain_intensity: f32,
}

/// A camera frame with pose, intrinsics and optional depth data.
#[derive(Clone, Serialize, Deserialize)]
pub struct PosedFrame {
    /// Capture time in seconds, monotonic within a session
    pub timestamp: f64,
    /// Camera-to-world transform
    pub transform: Matrix4<f32>,
    pub intrinsics: Matrix3<f32>,
    pub projection: Matrix4<f32>,
    /// Euler angles (pitch, yaw, roll) in radians, in tracker order x/y/z
    #[serde(default = "default_euler_angles")]
    pub euler_angles: Vector3<f32>,
    pub image_resolution: Resolution,
    pub image: ColorImage,
    #[serde(default)]
    pub depth: Option<DepthMap>,
    #[serde(default)]
    pub confidence: Option<ConfidenceMap>,
    /// World-space feature points observed in this frame
    #[serde(default)]
    pub feature_points: Option<Vec<Vector3<f32>>>,
    #[serde(default)]
    pub tracking_state: TrackingState,
    #[serde(default)]
    pub exposure: ExposureInfo,
    /// Raw EXIF side table from the camera pipeline
    #[serde(default)]
    pub exif: HashMap<String, String>,
    /// Nominal frame rate of the source
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_euler_angles() -> Vector3<f32> {
    Vector3::zeros()
}

fn default_fps() -> u32 {
    60
}

impl PosedFrame {
    /// Number of feature points, zero when none were reported.
    pub fn feature_point_count(&self) -> usize {
        self.feature_points.as_ref().map_or(0, |p| p.len())
    }

    /// Sub-second capture time from the EXIF side table, if present.
    pub fn subsec_time_original(&self) -> Option<&str> {
        self.exif.get("SubsecTimeOriginal").map(|s| s.as_str())
    }
}

impl std::fmt::Debug for PosedFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PosedFrame")
            .field("timestamp", &self.timestamp)
            .field("image_resolution", &self.image_resolution)
            .field("has_depth", &self.depth.is_some())
            .field("has_confidence", &self.confidence.is_some())
            .field("feature_points", &self.feature_point_count())
            .field("tracking_state", &self.tracking_state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_validation() {
        let ok = ColorImage {
            width: 2,
            height: 2,
            data: vec![0; 12],
        };
        assert!(ok.validate().is_ok());

        let short = DepthMap {
            width: 4,
            height: 4,
            data: vec![1.0; 15],
        };
        assert!(matches!(short.validate(), Err(ExportError::InvalidBuffer(_))));

        let empty = ConfidenceMap {
            width: 0,
            height: 3,
            data: Vec::new(),
        };
        assert!(matches!(empty.validate(), Err(ExportError::InvalidBuffer(_))));
    }

    #[test]
    fn test_display_rotation() {
        assert_eq!(DisplayOrientation::Portrait.camera_to_display_rotation(), 90.0);
        assert_eq!(DisplayOrientation::LandscapeLeft.camera_to_display_rotation(), 180.0);
        assert_eq!(
            DisplayOrientation::PortraitUpsideDown.camera_to_display_rotation(),
            -90.0
        );
        assert_eq!(DisplayOrientation::LandscapeRight.camera_to_display_rotation(), 0.0);
    }

    #[test]
    fn test_orientation_parse() {
        assert_eq!(
            DisplayOrientation::parse("landscape-left"),
            Some(DisplayOrientation::LandscapeLeft)
        );
        assert_eq!(DisplayOrientation::parse("Portrait"), Some(DisplayOrientation::Portrait));
        assert_eq!(DisplayOrientation::parse("sideways"), None);
    }

    #[test]
    fn test_tracking_state_serde() {
        let state: TrackingState = serde_json::from_str("\"not_available\"").unwrap();
        assert_eq!(state, TrackingState::NotAvailable);
        assert_eq!(TrackingState::default(), TrackingState::Normal);
    }
}
