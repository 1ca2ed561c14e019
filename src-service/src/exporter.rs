//! Per-keyframe artifact export.
//!
//! Each queued keyframe produces three sibling files: the photo, the
//! confidence map and the depth map. The three are written concurrently on
//! the blocking pool and joined; a failure in one does not cancel the others.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error};

use crate::capture::{ArtifactNames, FrameCacheEntry, FrameMetadata};
use crate::config::ExportConfig;
use crate::encoder::{write_confidence_map, write_depth_map, JpegPhoto};
use crate::error::ExportError;
use crate::session::{CaptureSession, ExportedImage};

/// Writes the artifacts of one keyframe into a session.
#[derive(Debug, Clone)]
pub struct ArtifactExporter {
    config: Arc<ExportConfig>,
}

impl ArtifactExporter {
    pub fn new(config: ExportConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export all three artifacts of `entry`, waiting for every sub-export.
    ///
    /// Each failure is logged on its own. The first failure, in photo,
    /// confidence, depth order, is returned.
    pub async fn export(
        &self,
        session: Arc<CaptureSession>,
        entry: FrameCacheEntry,
    ) -> Result<(), ExportError> {
        let entry = Arc::new(entry);

        let photo = {
            let (config, session, entry) = (self.config.clone(), session.clone(), entry.clone());
            tokio::task::spawn_blocking(move || export_photo(&config, &session, &entry))
        };
        let confidence = {
            let (config, session, entry) = (self.config.clone(), session.clone(), entry.clone());
            tokio::task::spawn_blocking(move || export_confidence(&config, &session, &entry))
        };
        let depth = {
            let (config, session, entry) = (self.config.clone(), session.clone(), entry.clone());
            tokio::task::spawn_blocking(move || export_depth(&config, &session, &entry))
        };

        let (photo, confidence, depth) = tokio::join!(photo, confidence, depth);
        let results = [
            ("photo", photo.map_err(ExportError::from).and_then(|r| r.map(|_| ()))),
            ("confidence", confidence.map_err(ExportError::from).and_then(|r| r)),
            ("depth", depth.map_err(ExportError::from).and_then(|r| r)),
        ];

        let mut first_error = None;
        for (kind, result) in results {
            if let Err(e) = result {
                error!(
                    "[Exporter] Frame {} ({}) {} export failed: {}",
                    entry.index, entry.id, kind, e
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Encode the photo, tag it, patch its GPS slots and record it in the session.
pub fn export_photo(
    config: &ExportConfig,
    session: &CaptureSession,
    entry: &FrameCacheEntry,
) -> Result<ExportedImage, ExportError> {
    let started = Instant::now();
    let frame = &entry.frame;
    let name = entry.image_name();
    let path = session.path().join(&name);

    let mut photo = JpegPhoto::create(
        &path,
        &frame.image,
        config.jpeg_quality,
        session.image_resolution().max_long_edge(),
        &entry.id,
        &config.device_make,
        &config.device_model,
    )?;

    let location = entry.location();
    photo.set_subsec_time_original(frame.subsec_time_original());
    photo.set_coordinate(&location.coordinate);
    photo.set_gps_location(&location);
    if let Some(rtk) = entry.rtk_location.as_ref().filter(|l| l.is_rtk) {
        photo.set_rtk_location(rtk, config.rtk_id.as_deref(), config.rtk_serial.as_deref());
    }

    let metadata = FrameMetadata::from_entry(entry, config.display_orientation);
    let intrinsics = &frame.intrinsics;
    photo.set_focal_length_pixel(
        intrinsics[(0, 0)] as f64,
        intrinsics[(0, 2)] as f64,
        intrinsics[(1, 2)] as f64,
        config.pixel_size_mm,
    );
    photo.set_euler_angles(&metadata.euler_angles);
    photo.export(&config.lens_model)?;

    let image = ExportedImage {
        name,
        path,
        is_rtk: photo.is_rtk(),
    };
    session.add_record(metadata, image.clone());

    debug!(
        "[Exporter] Photo {} written in {} ms",
        image.name,
        started.elapsed().as_millis()
    );
    Ok(image)
}

/// Write the confidence map. A frame without one is an error.
pub fn export_confidence(
    config: &ExportConfig,
    session: &CaptureSession,
    entry: &FrameCacheEntry,
) -> Result<(), ExportError> {
    let started = Instant::now();
    let confidence = entry
        .frame
        .confidence
        .as_ref()
        .ok_or(ExportError::MissingConfidence)?;

    let name = entry.confidence_map_name();
    write_confidence_map(
        &session.path().join(&name),
        confidence,
        &entry.id,
        &config.device_make,
        &config.device_model,
    )?;
    debug!(
        "[Exporter] Confidence {} written in {} ms",
        name,
        started.elapsed().as_millis()
    );
    Ok(())
}

/// Write the depth map. A frame without one is skipped.
pub fn export_depth(
    config: &ExportConfig,
    session: &CaptureSession,
    entry: &FrameCacheEntry,
) -> Result<(), ExportError> {
    let started = Instant::now();
    let Some(depth) = entry.frame.depth.as_ref() else {
        debug!("[Exporter] Frame {} has no depth map", entry.index);
        return Ok(());
    };

    let name = entry.depth_map_name();
    write_depth_map(
        &session.path().join(&name),
        depth,
        &entry.id,
        &config.device_make,
        &config.device_model,
    )?;
    debug!(
        "[Exporter] Depth {} written in {} ms",
        name,
        started.elapsed().as_millis()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ColorImage, ConfidenceMap, DepthMap, PosedFrame, Resolution};
    use nalgebra::{Matrix3, Matrix4, Vector3};
    use photocap_common::LocationModel;

    const NAME: &str = "2026-10-17-09-30-00";

    fn frame(depth: bool, confidence: bool) -> PosedFrame {
        PosedFrame {
            timestamp: 1.0,
            transform: Matrix4::identity(),
            intrinsics: Matrix3::new(1500.0, 0.0, 4.0, 0.0, 1500.0, 3.0, 0.0, 0.0, 1.0),
            projection: Matrix4::identity(),
            euler_angles: Vector3::new(0.1, 0.2, 0.3),
            image_resolution: Resolution::new(8, 6),
            image: ColorImage {
                width: 8,
                height: 6,
                data: vec![200; 8 * 6 * 3],
            },
            depth: depth.then(|| DepthMap {
                width: 4,
                height: 3,
                data: vec![1.25; 12],
            }),
            confidence: confidence.then(|| ConfidenceMap {
                width: 4,
                height: 3,
                data: vec![2; 12],
            }),
            feature_points: None,
            tracking_state: Default::default(),
            exposure: Default::default(),
            exif: [("SubsecTimeOriginal".to_string(), "123".to_string())].into(),
            fps: 60,
        }
    }

    fn entry(index: u32, depth: bool, confidence: bool) -> FrameCacheEntry {
        FrameCacheEntry::new(
            index,
            Arc::new(frame(depth, confidence)),
            LocationModel::new(37.422, -122.084, 12.0),
            None,
        )
    }

    #[tokio::test]
    async fn test_export_writes_three_artifacts() {
        let root = tempfile::tempdir().unwrap();
        let session = Arc::new(CaptureSession::create_named(root.path(), NAME, false).unwrap());
        let exporter = ArtifactExporter::new(ExportConfig::default());

        exporter.export(session.clone(), entry(4, true, true)).await.unwrap();

        assert!(session.path().join("Image_000004.jpg").is_file());
        assert!(session.path().join("DepthMap_000004.tiff").is_file());
        assert!(session.path().join("Confidence_000004.tiff").is_file());

        let records = session.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].image.name, "Image_000004.jpg");
        assert_eq!(records[0].metadata.index, 4);
        assert!(!records[0].image.is_rtk);
    }

    #[tokio::test]
    async fn test_missing_depth_is_skipped() {
        let root = tempfile::tempdir().unwrap();
        let session = Arc::new(CaptureSession::create_named(root.path(), NAME, false).unwrap());
        let exporter = ArtifactExporter::new(ExportConfig::default());

        exporter.export(session.clone(), entry(0, false, true)).await.unwrap();

        assert!(session.path().join("Image_000000.jpg").is_file());
        assert!(!session.path().join("DepthMap_000000.tiff").exists());
        assert!(session.path().join("Confidence_000000.tiff").is_file());
    }

    #[tokio::test]
    async fn test_missing_confidence_fails_only_that_artifact() {
        let root = tempfile::tempdir().unwrap();
        let session = Arc::new(CaptureSession::create_named(root.path(), NAME, false).unwrap());
        let exporter = ArtifactExporter::new(ExportConfig::default());

        let result = exporter.export(session.clone(), entry(1, true, false)).await;
        assert!(matches!(result, Err(ExportError::MissingConfidence)));

        assert!(session.path().join("Image_000001.jpg").is_file());
        assert!(session.path().join("DepthMap_000001.tiff").is_file());
        assert!(!session.path().join("Confidence_000001.tiff").exists());
        assert_eq!(session.frame_count(), 1);
    }

    #[test]
    fn test_rtk_fix_marks_photo() {
        let root = tempfile::tempdir().unwrap();
        let session = CaptureSession::create_named(root.path(), NAME, true).unwrap();
        let rtk = LocationModel::new(35.0, 139.0, 40.0).with_rtk();
        let entry = FrameCacheEntry::new(
            2,
            Arc::new(frame(false, true)),
            LocationModel::default(),
            Some(rtk),
        );

        let image = export_photo(&ExportConfig::default(), &session, &entry).unwrap();
        assert!(image.is_rtk);

        let bytes = std::fs::read(&image.path).unwrap();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("<Camera:RTKModel>newVidoc</Camera:RTKModel>"));
        assert!(text.contains("<exif:GPSLatitude>35.0</exif:GPSLatitude>"));
    }
}
