//! Shared value types for capture sessions and their on-disk datasets.

use serde::{Deserialize, Serialize};

/// Coordinate reference system used when none is supplied.
pub const DEFAULT_COORDINATE_SYSTEM: &str = "EPSG:4326";

/// A GPS or RTK fix attached to a captured frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationModel {
    pub latitude: f64,
    pub longitude: f64,
    /// Ellipsoidal altitude in meters
    pub altitude: f64,
    /// Horizontal accuracy in meters
    pub horizontal: f64,
    /// Vertical accuracy in meters
    pub vertical: f64,
    pub course: f64,
    pub course_accuracy: f64,
    /// Coordinate reference system, e.g. "EPSG:4326"
    #[serde(default = "default_coordinate")]
    pub coordinate: String,
    #[serde(default)]
    pub is_rtk: bool,
}

fn default_coordinate() -> String {
    DEFAULT_COORDINATE_SYSTEM.to_string()
}

impl Default for LocationModel {
    fn default() -> Self {
        Self {
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            horizontal: 0.0,
            vertical: 0.0,
            course: 0.0,
            course_accuracy: 0.0,
            coordinate: default_coordinate(),
            is_rtk: false,
        }
    }
}

impl LocationModel {
    /// Create a GPS fix with the default coordinate system.
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            horizontal: 0.01,
            vertical: 0.01,
            ..Self::default()
        }
    }

    /// Mark this fix as RTK-corrected.
    pub fn with_rtk(mut self) -> Self {
        self.is_rtk = true;
        self
    }

    /// Set horizontal and vertical accuracy.
    pub fn with_accuracy(mut self, horizontal: f64, vertical: f64) -> Self {
        self.horizontal = horizontal;
        self.vertical = vertical;
        self
    }

    /// Pick the RTK fix when one is available, the GPS fix otherwise.
    pub fn preferred(gps: &LocationModel, rtk: Option<&LocationModel>) -> LocationModel {
        rtk.cloned().unwrap_or_else(|| gps.clone())
    }
}

/// Filenames of the three artifacts exported for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageOutputModel {
    pub depth_map: String,
    pub photo: String,
    pub depth_map_confidence: String,
}

/// The `manifest.json` sidecar written when a session is finalized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestModel {
    pub log_files: Vec<String>,
    pub inputs: Vec<ImageOutputModel>,
}

impl ManifestModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_log_file(&mut self, file: impl Into<String>) {
        self.log_files.push(file.into());
    }

    pub fn append_image(&mut self, image: ImageOutputModel) {
        self.inputs.push(image);
    }
}

/// Resolution tier for exported photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageResolution {
    /// Native sensor resolution
    #[default]
    Maximum,
    /// Long edge capped at 1920 pixels
    High,
    /// Long edge capped at 1280 pixels
    Medium,
}

impl ImageResolution {
    /// Maximum long-edge length in pixels, or `None` for native size.
    pub fn max_long_edge(&self) -> Option<u32> {
        match self {
            ImageResolution::Maximum => None,
            ImageResolution::High => Some(1920),
            ImageResolution::Medium => Some(1280),
        }
    }

    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "maximum" | "max" => Some(ImageResolution::Maximum),
            "high" => Some(ImageResolution::High),
            "medium" => Some(ImageResolution::Medium),
            _ => None,
        }
    }
}

/// Lifecycle state of the keyframe pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// No session, frames are ignored
    Idle,
    /// Session open, frames are evaluated for admission
    Active,
    /// Session open and the export worker is busy
    Draining,
    /// Session finalized (archived or cleared)
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_default() {
        let location = LocationModel::default();
        assert_eq!(location.latitude, 0.0);
        assert_eq!(location.longitude, 0.0);
        assert_eq!(location.coordinate, "EPSG:4326");
        assert!(!location.is_rtk);
    }

    #[test]
    fn test_location_prefers_rtk() {
        let gps = LocationModel::new(37.0, -122.0, 10.0);
        let rtk = LocationModel::new(37.5, -122.5, 11.0).with_rtk();
        assert_eq!(LocationModel::preferred(&gps, Some(&rtk)), rtk);
        assert_eq!(LocationModel::preferred(&gps, None), gps);
    }

    #[test]
    fn test_manifest_serialization() {
        let mut manifest = ManifestModel::new();
        manifest.append_log_file("poses.json");
        manifest.append_image(ImageOutputModel {
            depth_map: "DepthMap_000000.tiff".to_string(),
            photo: "Image_000000.jpg".to_string(),
            depth_map_confidence: "Confidence_000000.tiff".to_string(),
        });

        let json = serde_json::to_string(&manifest).unwrap();
        assert_eq!(
            json,
            r#"{"log_files":["poses.json"],"inputs":[{"depth_map":"DepthMap_000000.tiff","photo":"Image_000000.jpg","depth_map_confidence":"Confidence_000000.tiff"}]}"#
        );
    }

    #[test]
    fn test_location_backward_compatible() {
        // Older dumps carry no coordinate system or RTK flag
        let json = r#"{"latitude":1.0,"longitude":2.0,"altitude":3.0,"horizontal":0.1,"vertical":0.2,"course":0.0,"course_accuracy":0.0}"#;
        let parsed: LocationModel = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.coordinate, DEFAULT_COORDINATE_SYSTEM);
        assert!(!parsed.is_rtk);
    }

    #[test]
    fn test_image_resolution_parse() {
        assert_eq!(ImageResolution::parse("MAX"), Some(ImageResolution::Maximum));
        assert_eq!(ImageResolution::parse("high"), Some(ImageResolution::High));
        assert_eq!(ImageResolution::parse("tiny"), None);
        assert_eq!(ImageResolution::Medium.max_long_edge(), Some(1280));
        assert_eq!(ImageResolution::Maximum.max_long_edge(), None);
    }
}
