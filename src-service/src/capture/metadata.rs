//! Per-frame records built around admitted keyframes.
//!
//! A [`FrameCacheEntry`] is what the pipeline queues for export: it shares the
//! frame's buffers and carries the index, id and location fix captured at
//! admission. [`FrameMetadata`] is the owned snapshot derived from it during
//! export, serialized into the session's pose log.

use std::sync::Arc;

use nalgebra::{Matrix3, Matrix4, Rotation3, Vector3, Vector4};
use photocap_common::{ImageOutputModel, LocationModel};
use rand::Rng;
use serde::Serialize;

use super::types::{DisplayOrientation, ExposureInfo, PosedFrame, Resolution};

/// Photo file name for a frame index, e.g. `Image_000007.jpg`.
pub fn image_file_name(index: u32) -> String {
    format!("Image_{:06}.jpg", index)
}

/// Depth map file name for a frame index.
pub fn depth_map_file_name(index: u32) -> String {
    format!("DepthMap_{:06}.tiff", index)
}

/// Confidence map file name for a frame index.
pub fn confidence_map_file_name(index: u32) -> String {
    format!("Confidence_{:06}.tiff", index)
}

/// File naming for the three artifacts of one keyframe.
pub trait ArtifactNames {
    fn frame_index(&self) -> u32;

    fn image_name(&self) -> String {
        image_file_name(self.frame_index())
    }

    fn depth_map_name(&self) -> String {
        depth_map_file_name(self.frame_index())
    }

    fn confidence_map_name(&self) -> String {
        confidence_map_file_name(self.frame_index())
    }

    /// Manifest entry listing the three artifact names.
    fn output_model(&self) -> ImageOutputModel {
        ImageOutputModel {
            depth_map: self.depth_map_name(),
            photo: self.image_name(),
            depth_map_confidence: self.confidence_map_name(),
        }
    }
}

/// Random lowercase hexadecimal string of `len` characters.
pub fn random_hex_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from_digit(rng.gen_range(0..16), 16).unwrap_or('0'))
        .collect()
}

/// Random string of `len` decimal digits.
pub fn random_digits(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from_digit(rng.gen_range(0..10), 10).unwrap_or('0'))
        .collect()
}

/// Random version-4 style UUID string, uppercase.
pub fn random_uuid() -> String {
    let hex = random_hex_id(32).to_uppercase();
    let variant = ['8', '9', 'A', 'B'][rand::thread_rng().gen_range(0..4)];
    format!(
        "{}-{}-4{}-{}{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[13..16],
        variant,
        &hex[17..20],
        &hex[20..32]
    )
}

/// Camera attitude in degrees as written to the photo tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct EulerAngles {
    pub yaw: f64,
    pub roll: f64,
    pub pitch: f64,
}

impl EulerAngles {
    /// Map tracker Euler angles `(x, y, z)` in radians to yaw/roll/pitch degrees.
    pub fn from_camera(euler: &Vector3<f32>) -> Self {
        Self {
            yaw: (-euler.y as f64).to_degrees(),
            roll: (-euler.z as f64).to_degrees(),
            pitch: (euler.x as f64).to_degrees(),
        }
    }
}

/// Rotation about the camera z axis into display orientation, with the Y and Z axes flipped.
pub fn rotate_matrix(orientation: DisplayOrientation) -> Matrix4<f32> {
    let flip_yz = Matrix4::from_diagonal(&Vector4::new(1.0, -1.0, -1.0, 1.0));
    let theta = orientation.camera_to_display_rotation().to_radians();
    flip_yz * Rotation3::from_axis_angle(&Vector3::z_axis(), theta).to_homogeneous()
}

/// World-to-view matrix for the given display orientation.
///
/// Falls back to identity when the transform is singular.
pub fn view_matrix(transform: &Matrix4<f32>, orientation: DisplayOrientation) -> Matrix4<f32> {
    let theta = orientation.camera_to_display_rotation().to_radians();
    let display = Rotation3::from_axis_angle(&Vector3::z_axis(), theta).to_homogeneous();
    (transform * display)
        .try_inverse()
        .unwrap_or_else(Matrix4::identity)
}

/// A keyframe admitted to the export queue.
#[derive(Clone)]
pub struct FrameCacheEntry {
    pub index: u32,
    /// 16-character hex capture id
    pub id: String,
    pub frame: Arc<PosedFrame>,
    pub fps: u32,
    pub gps_location: LocationModel,
    pub rtk_location: Option<LocationModel>,
}

impl FrameCacheEntry {
    pub fn new(
        index: u32,
        frame: Arc<PosedFrame>,
        gps_location: LocationModel,
        rtk_location: Option<LocationModel>,
    ) -> Self {
        let fps = frame.fps;
        Self {
            index,
            id: random_hex_id(16),
            frame,
            fps,
            gps_location,
            rtk_location,
        }
    }

    pub fn timestamp(&self) -> f64 {
        self.frame.timestamp
    }

    /// RTK fix when present, GPS fix otherwise.
    pub fn location(&self) -> LocationModel {
        LocationModel::preferred(&self.gps_location, self.rtk_location.as_ref())
    }
}

impl ArtifactNames for FrameCacheEntry {
    fn frame_index(&self) -> u32 {
        self.index
    }
}

impl std::fmt::Debug for FrameCacheEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCacheEntry")
            .field("index", &self.index)
            .field("id", &self.id)
            .field("timestamp", &self.frame.timestamp)
            .finish()
    }
}

/// Owned snapshot of an exported keyframe.
#[derive(Debug, Clone, Serialize)]
pub struct FrameMetadata {
    pub index: u32,
    pub id: String,
    pub timestamp: f64,
    pub transform: Matrix4<f32>,
    pub projection: Matrix4<f32>,
    pub intrinsics: Matrix3<f32>,
    pub euler_angles: EulerAngles,
    pub image_resolution: Resolution,
    pub exposure: ExposureInfo,
    pub gps_location: LocationModel,
    pub rtk_location: Option<LocationModel>,
    pub view_matrix: Matrix4<f32>,
    pub projection_matrix: Matrix4<f32>,
    pub rotate_matrix: Matrix4<f32>,
    pub fps: u32,
    #[serde(skip_serializing)]
    pub feature_points: Vec<Vector3<f32>>,
}

impl FrameMetadata {
    pub fn from_entry(entry: &FrameCacheEntry, orientation: DisplayOrientation) -> Self {
        let frame = &entry.frame;
        Self {
            index: entry.index,
            id: entry.id.clone(),
            timestamp: frame.timestamp,
            transform: frame.transform,
            projection: frame.projection,
            intrinsics: frame.intrinsics,
            euler_angles: EulerAngles::from_camera(&frame.euler_angles),
            image_resolution: frame.image_resolution,
            exposure: frame.exposure,
            gps_location: entry.gps_location.clone(),
            rtk_location: entry.rtk_location.clone(),
            view_matrix: view_matrix(&frame.transform, orientation),
            projection_matrix: frame.projection,
            rotate_matrix: rotate_matrix(orientation),
            fps: entry.fps,
            feature_points: frame.feature_points.clone().unwrap_or_default(),
        }
    }

    pub fn location(&self) -> LocationModel {
        LocationModel::preferred(&self.gps_location, self.rtk_location.as_ref())
    }

    pub fn is_rtk(&self) -> bool {
        self.rtk_location.as_ref().is_some_and(|l| l.is_rtk)
    }

    /// Camera position in world coordinates.
    pub fn position(&self) -> Vector3<f32> {
        Vector3::new(self.transform[(0, 3)], self.transform[(1, 3)], self.transform[(2, 3)])
    }
}

impl ArtifactNames for FrameMetadata {
    fn frame_index(&self) -> u32 {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::types::ColorImage;
    use approx::assert_relative_eq;

    fn frame() -> PosedFrame {
        let mut transform = Matrix4::identity();
        transform[(0, 3)] = 1.5;
        transform[(2, 3)] = -2.0;
        PosedFrame {
            timestamp: 12.5,
            transform,
            intrinsics: Matrix3::identity(),
            projection: Matrix4::identity(),
            euler_angles: Vector3::new(0.1, 0.2, 0.3),
            image_resolution: Resolution::new(4, 3),
            image: ColorImage {
                width: 4,
                height: 3,
                data: vec![0; 36],
            },
            depth: None,
            confidence: None,
            feature_points: None,
            tracking_state: Default::default(),
            exposure: Default::default(),
            exif: Default::default(),
            fps: 30,
        }
    }

    #[test]
    fn test_artifact_names() {
        assert_eq!(image_file_name(7), "Image_000007.jpg");
        assert_eq!(depth_map_file_name(12), "DepthMap_000012.tiff");
        assert_eq!(confidence_map_file_name(123456), "Confidence_123456.tiff");
    }

    #[test]
    fn test_output_model_from_entry() {
        let entry = FrameCacheEntry::new(3, Arc::new(frame()), LocationModel::default(), None);
        let model = entry.output_model();
        assert_eq!(model.photo, "Image_000003.jpg");
        assert_eq!(model.depth_map, "DepthMap_000003.tiff");
        assert_eq!(model.depth_map_confidence, "Confidence_000003.tiff");
        assert_eq!(entry.fps, 30);
        assert_eq!(entry.id.len(), 16);
    }

    #[test]
    fn test_random_ids() {
        let id = random_hex_id(16);
        assert_eq!(id.len(), 16);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let digits = random_digits(20);
        assert_eq!(digits.len(), 20);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));

        let uuid = random_uuid();
        assert_eq!(uuid.len(), 36);
        assert_eq!(&uuid[14..15], "4");
    }

    #[test]
    fn test_euler_mapping() {
        let angles = EulerAngles::from_camera(&Vector3::new(0.5, 0.25, -1.0));
        assert_relative_eq!(angles.pitch, 0.5f64.to_degrees(), epsilon = 1e-4);
        assert_relative_eq!(angles.yaw, -0.25f64.to_degrees(), epsilon = 1e-4);
        assert_relative_eq!(angles.roll, 1.0f64.to_degrees(), epsilon = 1e-4);
    }

    #[test]
    fn test_rotate_matrix_landscape_right_is_flip() {
        let m = rotate_matrix(DisplayOrientation::LandscapeRight);
        let expected = Matrix4::from_diagonal(&Vector4::new(1.0, -1.0, -1.0, 1.0));
        assert_relative_eq!(m, expected, epsilon = 1e-6);
    }

    #[test]
    fn test_rotate_matrix_portrait() {
        let m = rotate_matrix(DisplayOrientation::Portrait);
        // Rz(90) maps x to y, then the flip negates y
        let x = m * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(x, Vector4::new(0.0, -1.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_metadata_from_entry() {
        let gps = LocationModel::new(37.0, -122.0, 5.0);
        let rtk = LocationModel::new(37.1, -122.1, 6.0).with_rtk();
        let entry = FrameCacheEntry::new(1, Arc::new(frame()), gps, Some(rtk.clone()));
        let meta = FrameMetadata::from_entry(&entry, DisplayOrientation::LandscapeRight);

        assert_eq!(meta.index, 1);
        assert_eq!(meta.id, entry.id);
        assert!(meta.is_rtk());
        assert_eq!(meta.location(), rtk);
        assert_relative_eq!(meta.position(), Vector3::new(1.5, 0.0, -2.0));
        assert_relative_eq!(meta.view_matrix * meta.transform, Matrix4::identity(), epsilon = 1e-5);
    }
}
