//! End-to-end session: start, admit keyframes, stop and inspect the output.

use std::fs::File;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use nalgebra::{Matrix3, Matrix4, Vector3};
use photocap_common::{LocationModel, ManifestModel, SessionState};
use photocap_service::capture::{
    ColorImage, ConfidenceMap, DepthMap, PosedFrame, Resolution, TrackingState,
};
use photocap_service::exif::read_gps_coordinates;
use photocap_service::{FrameDecision, KeyframePipeline, PipelineConfig, ProgressCallback};

fn frame(timestamp: f64, x: f32) -> PosedFrame {
    let mut transform = Matrix4::identity();
    transform[(0, 3)] = x;
    PosedFrame {
        timestamp,
        transform,
        intrinsics: Matrix3::new(554.0, 0.0, 320.0, 0.0, 554.0, 240.0, 0.0, 0.0, 1.0),
        projection: Matrix4::identity(),
        euler_angles: Vector3::new(0.0, 0.5, 0.0),
        image_resolution: Resolution::new(640, 480),
        image: ColorImage {
            width: 16,
            height: 12,
            data: (0..16 * 12 * 3).map(|i| (i % 251) as u8).collect(),
        },
        depth: Some(DepthMap {
            width: 4,
            height: 3,
            data: vec![1.0; 12],
        }),
        confidence: Some(ConfidenceMap {
            width: 4,
            height: 3,
            data: vec![2; 12],
        }),
        feature_points: None,
        tracking_state: TrackingState::Normal,
        exposure: Default::default(),
        exif: Default::default(),
        fps: 60,
    }
}

fn config(root: &std::path::Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.storage.root = Some(root.to_path_buf());
    config
}

fn archive_entries(path: &std::path::Path) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_session_without_archive() {
    let root = tempfile::tempdir().unwrap();
    let mut pipeline = KeyframePipeline::new(config(root.path()));
    pipeline.start().await.unwrap();
    pipeline.set_location(LocationModel::new(-33.8688, 151.2093, 58.0), None);

    let decisions: Vec<FrameDecision> = [(0.0, 0.0), (0.1, 0.005), (0.2, 3.0), (0.3, 6.0)]
        .into_iter()
        .map(|(t, x)| pipeline.handle_frame(frame(t, x)))
        .collect();
    assert_eq!(decisions[0], FrameDecision::Admitted { index: 0 });
    assert!(matches!(decisions[1], FrameDecision::Dropped { .. }));
    assert_eq!(decisions[2], FrameDecision::Admitted { index: 1 });
    assert_eq!(decisions[3], FrameDecision::Admitted { index: 2 });

    let summary = pipeline.stop(false, None).await.unwrap();
    assert_eq!(summary.exported, 3);
    assert_eq!(summary.failed, 0);
    assert!(summary.archive.is_none());

    let dir = &summary.directory;
    for index in 0..3 {
        assert!(dir.join(format!("Image_{:06}.jpg", index)).is_file());
        assert!(dir.join(format!("DepthMap_{:06}.tiff", index)).is_file());
        assert!(dir.join(format!("Confidence_{:06}.tiff", index)).is_file());
    }

    // Manifest on disk matches the returned one
    let text = std::fs::read_to_string(dir.join("manifest.json")).unwrap();
    let manifest: ManifestModel = serde_json::from_str(&text).unwrap();
    assert_eq!(manifest, summary.manifest);
    assert_eq!(manifest.log_files, vec!["poses.json".to_string()]);
    // The drain worker exports in admission order
    let names: Vec<&str> = manifest.inputs.iter().map(|i| i.photo.as_str()).collect();
    assert_eq!(names, ["Image_000000.jpg", "Image_000001.jpg", "Image_000002.jpg"]);

    let poses: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.join("poses.json")).unwrap()).unwrap();
    let indices: Vec<u64> = poses
        .as_array()
        .unwrap()
        .iter()
        .map(|pose| pose["index"].as_u64().unwrap())
        .collect();
    assert_eq!(indices, [0, 1, 2]);

    let track = std::fs::read_to_string(dir.join("_gps").join("track.json")).unwrap();
    let track: serde_json::Value = serde_json::from_str(&track).unwrap();
    assert_eq!(track.as_array().map(|a| a.len()), Some(3));

    // Hemisphere is carried by the reference tags; slots hold absolute values
    let gps = read_gps_coordinates(&dir.join("Image_000001.jpg")).unwrap();
    let latitude = gps.latitude.unwrap().to_degrees();
    let longitude = gps.longitude.unwrap().to_degrees();
    assert!((latitude - 33.8688).abs() < 1e-4, "latitude {}", latitude);
    assert!((longitude - 151.2093).abs() < 1e-4, "longitude {}", longitude);

    let mut bytes = Vec::new();
    File::open(dir.join("Image_000001.jpg"))
        .unwrap()
        .read_to_end(&mut bytes)
        .unwrap();
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("<exif:GPSLatitudeRef>S</exif:GPSLatitudeRef>"));
    assert!(text.contains("<exif:GPSLongitudeRef>E</exif:GPSLongitudeRef>"));
}

#[tokio::test]
async fn test_session_archive_with_progress() {
    let root = tempfile::tempdir().unwrap();
    let mut pipeline = KeyframePipeline::new(config(root.path()));
    let session = pipeline.start().await.unwrap();
    assert_eq!(pipeline.state(), SessionState::Active);

    for i in 0..3 {
        let decision = pipeline.handle_frame(frame(i as f64, i as f32 * 4.0));
        assert_eq!(decision, FrameDecision::Admitted { index: i });
    }

    let reports = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(AtomicUsize::new(0));
    let callback: ProgressCallback = {
        let (reports, calls) = (reports.clone(), calls.clone());
        Box::new(move |ratio: f64| {
            calls.fetch_add(1, Ordering::SeqCst);
            reports.lock().unwrap().push(ratio);
        })
    };

    let summary = pipeline.stop(true, Some(callback)).await.unwrap();
    assert_eq!(pipeline.state(), SessionState::Closed);
    assert_eq!(summary.exported, 3);

    let archive = summary.archive.unwrap();
    assert_eq!(
        archive.file_name().map(|n| n.to_string_lossy().to_string()),
        Some(format!("{}.zip", session.name()))
    );
    assert!(!session.path().exists());

    let reports = reports.lock().unwrap();
    assert!(calls.load(Ordering::SeqCst) >= 1);
    assert_eq!(reports.last().copied(), Some(1.0));
    assert!(reports.windows(2).all(|w| w[0] <= w[1]));

    let entries = archive_entries(&archive);
    assert!(entries.contains(&"manifest.json".to_string()));
    assert!(entries.contains(&"poses.json".to_string()));
    assert!(entries.contains(&"Image_000002.jpg".to_string()));
    assert!(entries.contains(&"DepthMap_000000.tiff".to_string()));
    assert_eq!(entries.len(), 11);
}
