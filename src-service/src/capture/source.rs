//! Pull-based frame sources.
//!
//! The pipeline is fed by polling a [`FrameSource`]. [`RecordedFrames`] replays
//! a JSON-lines recording where each line is one frame, optionally carrying
//! the GPS/RTK fix that was current when it was captured.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, Matrix4, Vector3};
use photocap_common::LocationModel;
use serde::Deserialize;

use super::types::{
    ColorImage, ConfidenceMap, DepthMap, ExposureInfo, PosedFrame, Resolution, TrackingState,
};
use crate::error::SourceError;

/// A frame pulled from a source together with any location update.
pub struct SourceFrame {
    pub frame: PosedFrame,
    pub gps: Option<LocationModel>,
    pub rtk: Option<LocationModel>,
}

/// Trait for anything that can hand the pipeline its current frame.
pub trait FrameSource: Send {
    /// Next available frame, or `None` when the source is exhausted.
    fn current_frame(&mut self) -> Result<Option<SourceFrame>, SourceError>;
}

/// One recorded frame line.
///
/// The color image is either inline (`image`) or loaded from `image_path`,
/// resolved relative to the recording file.
#[derive(Deserialize)]
struct FrameRecord {
    timestamp: f64,
    transform: Matrix4<f32>,
    intrinsics: Matrix3<f32>,
    #[serde(default = "default_projection")]
    projection: Matrix4<f32>,
    #[serde(default)]
    euler_angles: Option<Vector3<f32>>,
    #[serde(default)]
    image: Option<ColorImage>,
    #[serde(default)]
    image_path: Option<PathBuf>,
    #[serde(default)]
    depth: Option<DepthMap>,
    #[serde(default)]
    confidence: Option<ConfidenceMap>,
    #[serde(default)]
    feature_points: Option<Vec<Vector3<f32>>>,
    #[serde(default)]
    tracking_state: TrackingState,
    #[serde(default)]
    exposure: ExposureInfo,
    #[serde(default)]
    exif: HashMap<String, String>,
    #[serde(default)]
    fps: Option<u32>,
    #[serde(default)]
    gps: Option<LocationModel>,
    #[serde(default)]
    rtk: Option<LocationModel>,
}

fn default_projection() -> Matrix4<f32> {
    Matrix4::identity()
}

fn load_image(path: &Path) -> Result<ColorImage, SourceError> {
    let rgb = image::open(path)
        .map_err(|e| SourceError::Image(format!("{}: {}", path.display(), e)))?
        .to_rgb8();
    Ok(ColorImage {
        width: rgb.width(),
        height: rgb.height(),
        data: rgb.into_raw(),
    })
}

impl FrameRecord {
    fn into_source_frame(self, base_dir: &Path, line: usize) -> Result<SourceFrame, SourceError> {
        let image = match (self.image, self.image_path) {
            (Some(image), _) => image,
            (None, Some(path)) => load_image(&base_dir.join(path))?,
            (None, None) => {
                return Err(SourceError::Parse {
                    line,
                    message: "frame has neither image nor image_path".to_string(),
                })
            }
        };

        let frame = PosedFrame {
            timestamp: self.timestamp,
            transform: self.transform,
            intrinsics: self.intrinsics,
            projection: self.projection,
            euler_angles: self.euler_angles.unwrap_or_else(Vector3::zeros),
            image_resolution: Resolution::new(image.width, image.height),
            image,
            depth: self.depth,
            confidence: self.confidence,
            feature_points: self.feature_points,
            tracking_state: self.tracking_state,
            exposure: self.exposure,
            exif: self.exif,
            fps: self.fps.unwrap_or(60),
        };

        Ok(SourceFrame {
            frame,
            gps: self.gps,
            rtk: self.rtk,
        })
    }
}

/// Replays frames from a JSON-lines recording.
pub struct RecordedFrames {
    base_dir: PathBuf,
    lines: Lines<BufReader<File>>,
    line_number: usize,
}

impl RecordedFrames {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        let base_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(Self {
            base_dir,
            lines: BufReader::new(file).lines(),
            line_number: 0,
        })
    }
}

impl FrameSource for RecordedFrames {
    fn current_frame(&mut self) -> Result<Option<SourceFrame>, SourceError> {
        loop {
            let Some(line) = self.lines.next() else {
                return Ok(None);
            };
            let line = line?;
            self.line_number += 1;

            // Blank lines and comments are allowed between frames
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let record: FrameRecord =
                serde_json::from_str(trimmed).map_err(|e| SourceError::Parse {
                    line: self.line_number,
                    message: e.to_string(),
                })?;
            return record
                .into_source_frame(&self.base_dir, self.line_number)
                .map(Some);
        }
    }
}
