//! Overlap estimation between a candidate frame and the last kept keyframe.
//!
//! Two estimators are available. The field-of-view estimator projects both
//! camera frusta onto a virtual plane at the scene distance and combines
//! per-axis translation overlap with yaw/pitch overlap. The feature-point
//! estimator counts previous points that have a near neighbour in the current
//! frame. The pipeline picks one per frame based on feature-point density.

use nalgebra::{Matrix3, Matrix4, Vector3};

use crate::capture::{DepthMap, FrameMetadata, PosedFrame, Resolution};

/// Feature-point count at or below which the field-of-view estimator is used.
pub const FEATURE_POINT_DENSITY_THRESHOLD: usize = 250;

/// Lower bound for the feature-point match radius, in metres.
pub const MIN_MATCH_THRESHOLD: f32 = 0.01;

/// Match radius as a fraction of the scene distance.
pub const MATCH_DISTANCE_FACTOR: f32 = 0.095;

/// Angular overlap above this value counts as full overlap.
pub const ANGULAR_SNAP_THRESHOLD: f64 = 0.9;

/// Yaw tolerance as a multiple of the horizontal field of view.
pub const YAW_TOLERANCE_FACTOR: f32 = 3.5;

/// Scene distance used when no depth samples are available.
pub const DEFAULT_SCENE_DISTANCE: f32 = 1.0;

/// Pose data needed to compare two frames.
///
/// Implemented by live frames, exported metadata and the pipeline's cached
/// keyframe snapshot, so the previous frame can be any of them.
pub trait PoseView {
    fn transform(&self) -> &Matrix4<f32>;
    fn intrinsics(&self) -> &Matrix3<f32>;
    fn image_resolution(&self) -> Resolution;
    fn feature_points(&self) -> &[Vector3<f32>];
}

impl PoseView for PosedFrame {
    fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    fn intrinsics(&self) -> &Matrix3<f32> {
        &self.intrinsics
    }

    fn image_resolution(&self) -> Resolution {
        self.image_resolution
    }

    fn feature_points(&self) -> &[Vector3<f32>] {
        self.feature_points.as_deref().unwrap_or(&[])
    }
}

impl PoseView for FrameMetadata {
    fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    fn intrinsics(&self) -> &Matrix3<f32> {
        &self.intrinsics
    }

    fn image_resolution(&self) -> Resolution {
        self.image_resolution
    }

    fn feature_points(&self) -> &[Vector3<f32>] {
        &self.feature_points
    }
}

/// Pose of the last kept keyframe, without its pixel buffers.
#[derive(Debug, Clone)]
pub struct PoseSnapshot {
    pub transform: Matrix4<f32>,
    pub intrinsics: Matrix3<f32>,
    pub image_resolution: Resolution,
    pub feature_points: Vec<Vector3<f32>>,
}

impl PoseSnapshot {
    pub fn from_frame(frame: &PosedFrame) -> Self {
        Self {
            transform: frame.transform,
            intrinsics: frame.intrinsics,
            image_resolution: frame.image_resolution,
            feature_points: frame.feature_points.clone().unwrap_or_default(),
        }
    }
}

impl PoseView for PoseSnapshot {
    fn transform(&self) -> &Matrix4<f32> {
        &self.transform
    }

    fn intrinsics(&self) -> &Matrix3<f32> {
        &self.intrinsics
    }

    fn image_resolution(&self) -> Resolution {
        self.image_resolution
    }

    fn feature_points(&self) -> &[Vector3<f32>] {
        &self.feature_points
    }
}

/// Horizontal and vertical field of view in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldOfView {
    pub horizontal: f32,
    pub vertical: f32,
}

/// Field of view from pinhole intrinsics: `2 * atan(size / (2 * f))` per axis.
pub fn field_of_view(intrinsics: &Matrix3<f32>, resolution: Resolution) -> FieldOfView {
    let fx = intrinsics[(0, 0)];
    let fy = intrinsics[(1, 1)];
    FieldOfView {
        horizontal: 2.0 * (resolution.width as f32 / (2.0 * fx)).atan(),
        vertical: 2.0 * (resolution.height as f32 / (2.0 * fy)).atan(),
    }
}

/// Which estimator to use for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlapMethod {
    FieldOfView,
    FeaturePoints,
}

/// Sparse scenes fall back to the field-of-view estimator.
pub fn select_method(feature_point_count: usize, density_threshold: usize) -> OverlapMethod {
    if feature_point_count <= density_threshold {
        OverlapMethod::FieldOfView
    } else {
        OverlapMethod::FeaturePoints
    }
}

/// Estimate overlap with the method chosen from the current frame's point density.
pub fn estimate<P: PoseView + ?Sized>(
    previous: &P,
    current: &PosedFrame,
    scene_distance: f32,
    density_threshold: usize,
) -> (OverlapMethod, f64) {
    let method = select_method(current.feature_point_count(), density_threshold);
    let overlap = match method {
        OverlapMethod::FieldOfView => fov_overlap(previous, current, scene_distance),
        OverlapMethod::FeaturePoints => feature_point_overlap(previous, current, scene_distance),
    };
    (method, overlap)
}

/// Viewing direction (negative camera Z axis) of a camera-to-world transform.
fn view_direction(transform: &Matrix4<f32>) -> Vector3<f32> {
    -Vector3::new(transform[(0, 2)], transform[(1, 2)], transform[(2, 2)])
}

fn yaw_of(direction: &Vector3<f32>) -> f32 {
    direction.z.atan2(direction.x)
}

fn pitch_of(direction: &Vector3<f32>) -> f32 {
    direction
        .y
        .atan2((direction.x * direction.x + direction.z * direction.z).sqrt())
}

/// Wrap an angle into [-pi, pi].
fn normalize_angle(mut angle: f32) -> f32 {
    use std::f32::consts::PI;
    while angle > PI {
        angle -= 2.0 * PI;
    }
    while angle < -PI {
        angle += 2.0 * PI;
    }
    angle
}

/// Field-of-view overlap in [0, 1] at the given scene distance.
///
/// A singular current transform yields 1.0 so the frame is not admitted.
pub fn fov_overlap<P: PoseView + ?Sized>(
    previous: &P,
    current: &PosedFrame,
    scene_distance: f32,
) -> f64 {
    let previous_transform = previous.transform();
    let current_transform = &current.transform;

    let direction_prev = view_direction(previous_transform);
    let direction_curr = view_direction(current_transform);

    let yaw_diff = normalize_angle(yaw_of(&direction_curr) - yaw_of(&direction_prev)).abs();
    let pitch_diff = (pitch_of(&direction_curr) - pitch_of(&direction_prev)).abs();

    let fov = field_of_view(&current.intrinsics, current.image_resolution);

    let Some(current_inverse) = current_transform.try_inverse() else {
        tracing::debug!("Singular camera transform at t={}", current.timestamp);
        return 1.0;
    };
    let relative = current_inverse * previous_transform;
    let translation = Vector3::new(relative[(0, 3)], relative[(1, 3)], relative[(2, 3)]);

    let view_width = 2.0 * scene_distance * (fov.horizontal / 2.0).tan();
    let view_height = 2.0 * scene_distance * (fov.vertical / 2.0).tan();

    let ratio_x = (1.0 - translation.x.abs() / view_width).max(0.0);
    let ratio_y = (1.0 - translation.y.abs() / view_height).max(0.0);
    let ratio_z = (1.0 - translation.z.abs() / (view_width * view_height)).max(0.0);

    let ratio_yaw = (1.0 - yaw_diff / (fov.horizontal * YAW_TOLERANCE_FACTOR)).max(0.0);
    let ratio_pitch = (1.0 - pitch_diff / fov.vertical).max(0.0);

    let mut angle_overlap = (ratio_yaw * ratio_pitch) as f64;
    if angle_overlap > ANGULAR_SNAP_THRESHOLD {
        angle_overlap = 1.0;
    }

    (ratio_x * ratio_y * ratio_z) as f64 * angle_overlap
}

/// Count previous points with at least one current point strictly closer than `threshold`.
fn match_feature_points(previous: &[Vector3<f32>], current: &[Vector3<f32>], threshold: f32) -> usize {
    previous
        .iter()
        .filter(|p| current.iter().any(|c| (*p - c).norm() < threshold))
        .count()
}

/// Feature-point overlap: matched previous points over the smaller point count.
///
/// Returns 1.0 when either frame has no points.
pub fn feature_point_overlap<P: PoseView + ?Sized>(
    previous: &P,
    current: &PosedFrame,
    scene_distance: f32,
) -> f64 {
    let threshold = (scene_distance * MATCH_DISTANCE_FACTOR).max(MIN_MATCH_THRESHOLD);
    let previous_points = previous.feature_points();
    let current_points = PoseView::feature_points(current);

    let min_count = previous_points.len().min(current_points.len());
    if min_count == 0 {
        return 1.0;
    }

    let matches = match_feature_points(previous_points, current_points, threshold);
    matches as f64 / min_count as f64
}

/// Mean depth of the scene, or [`DEFAULT_SCENE_DISTANCE`] without usable samples.
pub fn estimate_scene_distance(depth: Option<&DepthMap>) -> f32 {
    let Some(depth) = depth else {
        return DEFAULT_SCENE_DISTANCE;
    };
    if depth.data.is_empty() {
        return DEFAULT_SCENE_DISTANCE;
    }

    let total: f32 = depth.data.iter().sum();
    let mean = total / depth.data.len() as f32;
    if mean.is_finite() && mean > 0.0 {
        mean
    } else {
        DEFAULT_SCENE_DISTANCE
    }
}
