//! Keyframe selection and export pipeline.
//!
//! ```text
//! handle_frame(PosedFrame)
//!        │
//!        ├──► tracking gate
//!        ├──► overlap against last keyframe ──► dropped
//!        ▼
//! FrameQueue (Arc<Mutex<_>>)
//!        │  wake (single-slot channel)
//!        ▼
//! drain worker ──► ArtifactExporter ──► CaptureSession
//! ```
//!
//! Frames are evaluated synchronously on the caller's thread. A single worker
//! task drains the queue one keyframe at a time; only the three artifacts of
//! the current keyframe are ever written concurrently.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::path::PathBuf;
use std::time::Duration;

use photocap_common::{LocationModel, ManifestModel, SessionState};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capture::{FrameCacheEntry, PosedFrame, TrackingState};
use crate::config::PipelineConfig;
use crate::error::SessionError;
use crate::exporter::ArtifactExporter;
use crate::overlap::{self, OverlapMethod, PoseSnapshot};
use crate::queue::FrameQueue;
use crate::session::CaptureSession;

/// Callback for archive progress, called with ratios in [0, 1].
pub type ProgressCallback = Box<dyn Fn(f64) + Send + Sync + 'static>;

/// Poll interval while waiting for the export worker to go idle.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Why a frame was not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// No session is accepting frames
    NotActive,
    /// Tracking is limited or unavailable
    Tracking(TrackingState),
}

/// Outcome of [`KeyframePipeline::handle_frame`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameDecision {
    Ignored(IgnoreReason),
    /// Too similar to the last keyframe
    Dropped { method: OverlapMethod, overlap: f64 },
    /// Queued for export under this index
    Admitted { index: u32 },
}

/// Export counters for the current session.
#[derive(Debug, Default)]
pub struct PipelineStats {
    exported: AtomicUsize,
    failed: AtomicUsize,
}

impl PipelineStats {
    pub fn exported(&self) -> usize {
        self.exported.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.exported.store(0, Ordering::SeqCst);
        self.failed.store(0, Ordering::SeqCst);
    }
}

/// Result of stopping a session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub name: String,
    pub directory: PathBuf,
    /// Archive path when the session was zipped
    pub archive: Option<PathBuf>,
    pub manifest: ManifestModel,
    pub exported: usize,
    pub failed: usize,
}

/// Composition root: owns the current session, the queue and the export worker.
pub struct KeyframePipeline {
    config: PipelineConfig,
    exporter: ArtifactExporter,
    state: SessionState,
    session: Option<Arc<CaptureSession>>,
    queue: Arc<Mutex<FrameQueue>>,
    processing: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    wake: Option<mpsc::Sender<()>>,
    worker: Option<JoinHandle<()>>,
    last_keyframe: Option<PoseSnapshot>,
    next_index: u32,
    overlap_threshold: f64,
    gps_location: LocationModel,
    rtk_location: Option<LocationModel>,
}

impl KeyframePipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let exporter = ArtifactExporter::new(config.export.clone());
        let overlap_threshold = config.capture.initial_overlap_threshold;
        Self {
            config,
            exporter,
            state: SessionState::Idle,
            session: None,
            queue: Arc::new(Mutex::new(FrameQueue::new())),
            processing: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(PipelineStats::default()),
            wake: None,
            worker: None,
            last_keyframe: None,
            next_index: 0,
            overlap_threshold,
            gps_location: LocationModel::default(),
            rtk_location: None,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Lifecycle state; an active session reports `Draining` while the worker is busy.
    pub fn state(&self) -> SessionState {
        if self.state == SessionState::Active && self.is_processing() {
            SessionState::Draining
        } else {
            self.state
        }
    }

    pub fn session(&self) -> Option<Arc<CaptureSession>> {
        self.session.clone()
    }

    pub fn overlap_threshold(&self) -> f64 {
        self.overlap_threshold
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).count()
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Location fixes attached to frames admitted from now on.
    pub fn set_location(&mut self, gps: LocationModel, rtk: Option<LocationModel>) {
        self.gps_location = gps;
        self.rtk_location = rtk;
    }

    /// Open a fresh session, discarding any session still open.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn start(&mut self) -> Result<Arc<CaptureSession>, SessionError> {
        if self.session.is_some() {
            warn!("[Pipeline] Starting over an open session, clearing it");
            self.clear().await;
        }

        let root = self.config.storage.resolve_root();
        let mut session = CaptureSession::create(&root, self.config.capture.rtk)?;
        session.set_overlap_threshold(self.config.capture.operating_overlap_threshold);
        session.set_image_resolution(self.config.capture.export_resolution);
        let session = Arc::new(session);

        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.stats.reset();
        self.last_keyframe = None;
        self.next_index = 0;
        self.overlap_threshold = session.overlap_threshold();

        let (tx, rx) = mpsc::channel(1);
        self.worker = Some(tokio::spawn(drain_worker(
            rx,
            self.queue.clone(),
            self.processing.clone(),
            self.stats.clone(),
            self.exporter.clone(),
            session.clone(),
        )));
        self.wake = Some(tx);
        self.session = Some(session.clone());
        self.state = SessionState::Active;

        info!(
            "[Pipeline] Session {} started (threshold {}, resolution {:?})",
            session.name(),
            self.overlap_threshold,
            session.image_resolution()
        );
        Ok(session)
    }

    /// Evaluate one frame and queue it for export if it is a new keyframe.
    pub fn handle_frame(&mut self, frame: PosedFrame) -> FrameDecision {
        if self.state != SessionState::Active {
            return FrameDecision::Ignored(IgnoreReason::NotActive);
        }
        if frame.tracking_state != TrackingState::Normal {
            return FrameDecision::Ignored(IgnoreReason::Tracking(frame.tracking_state));
        }

        if let Some(previous) = &self.last_keyframe {
            let scene_distance = overlap::estimate_scene_distance(frame.depth.as_ref());
            let (method, overlap) = overlap::estimate(
                previous,
                &frame,
                scene_distance,
                self.config.capture.feature_point_density_threshold,
            );
            if overlap > self.overlap_threshold {
                debug!(
                    "[Pipeline] Dropped frame at {:.3}s, overlap {:.3} ({:?})",
                    frame.timestamp, overlap, method
                );
                return FrameDecision::Dropped { method, overlap };
            }
        }

        let index = self.next_index;
        self.next_index += 1;
        self.last_keyframe = Some(PoseSnapshot::from_frame(&frame));

        let entry = FrameCacheEntry::new(
            index,
            Arc::new(frame),
            self.gps_location.clone(),
            self.rtk_location.clone(),
        );
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .enqueue(entry);
        self.wake_worker();

        debug!("[Pipeline] Admitted keyframe {}", index);
        FrameDecision::Admitted { index }
    }

    fn wake_worker(&self) {
        if let Some(tx) = &self.wake {
            match tx.try_send(()) {
                // A full slot means a wake is already pending
                Ok(()) | Err(mpsc::error::TrySendError::Full(())) => {}
                Err(mpsc::error::TrySendError::Closed(())) => {
                    warn!("[Pipeline] Export worker is gone, keyframe left queued")
                }
            }
        }
    }

    /// Wait until the queue is empty and no export is in flight.
    pub async fn wait_idle(&self) {
        loop {
            if self.queue_len() == 0 && !self.is_processing() {
                return;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    async fn shutdown_worker(&mut self) {
        // Dropping the sender lets the worker drain what is left and exit
        self.wake = None;
        if let Some(worker) = self.worker.take() {
            if let Err(e) = worker.await {
                error!("[Pipeline] Export worker ended abnormally: {}", e);
            }
        }
    }

    /// Stop admitting frames, export everything queued, and finalize the session.
    ///
    /// When `archive` is set the session directory is zipped into
    /// `<name>.zip` and removed, reporting progress through `on_progress`.
    pub async fn stop(
        &mut self,
        archive: bool,
        on_progress: Option<ProgressCallback>,
    ) -> Result<SessionSummary, SessionError> {
        let session = self.session.take().ok_or(SessionError::NotActive)?;
        self.state = SessionState::Draining;
        self.shutdown_worker().await;

        let result = finish_session(&session, archive, on_progress).await;
        self.reset_after_session();

        let (manifest, archive_path) = result?;
        let summary = SessionSummary {
            name: session.name().to_string(),
            directory: session.path().to_path_buf(),
            archive: archive_path,
            manifest,
            exported: self.stats.exported(),
            failed: self.stats.failed(),
        };
        info!(
            "[Pipeline] Session {} stopped: {} exported, {} failed",
            summary.name, summary.exported, summary.failed
        );
        Ok(summary)
    }

    /// Discard the open session: pending keyframes are dropped and its directory deleted.
    pub async fn clear(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.state = SessionState::Draining;
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).clear();
        self.shutdown_worker().await;
        session.clear();
        self.reset_after_session();
    }

    fn reset_after_session(&mut self) {
        self.state = SessionState::Closed;
        self.last_keyframe = None;
        self.next_index = 0;
        self.overlap_threshold = self.config.capture.initial_overlap_threshold;
    }
}

async fn finish_session(
    session: &Arc<CaptureSession>,
    archive: bool,
    on_progress: Option<ProgressCallback>,
) -> Result<(ManifestModel, Option<PathBuf>), SessionError> {
    let manifest = session.finalize()?;
    if !archive {
        return Ok((manifest, None));
    }

    let session = session.clone();
    let path = tokio::task::spawn_blocking(move || {
        session.archive_with_progress(|ratio| {
            if let Some(callback) = &on_progress {
                callback(ratio);
            }
        })
    })
    .await
    .map_err(|e| SessionError::Archive(e.to_string()))??;
    Ok((manifest, Some(path)))
}

/// Drain the queue on every wake until the wake channel closes.
async fn drain_worker(
    mut wake: mpsc::Receiver<()>,
    queue: Arc<Mutex<FrameQueue>>,
    processing: Arc<AtomicBool>,
    stats: Arc<PipelineStats>,
    exporter: ArtifactExporter,
    session: Arc<CaptureSession>,
) {
    debug!("[Pipeline] Export worker started for {}", session.name());
    loop {
        let signal = wake.recv().await;
        drain_queue(&queue, &processing, &stats, &exporter, &session).await;
        if signal.is_none() {
            break;
        }
    }
    debug!("[Pipeline] Export worker exiting");
}

async fn drain_queue(
    queue: &Mutex<FrameQueue>,
    processing: &AtomicBool,
    stats: &PipelineStats,
    exporter: &ArtifactExporter,
    session: &Arc<CaptureSession>,
) {
    processing.store(true, Ordering::SeqCst);
    loop {
        let entry = queue.lock().unwrap_or_else(|e| e.into_inner()).dequeue();
        let Some(entry) = entry else {
            break;
        };

        let index = entry.index;
        match exporter.export(session.clone(), entry).await {
            Ok(()) => {
                stats.exported.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::SeqCst);
                warn!("[Pipeline] Keyframe {} exported with errors: {}", index, e);
            }
        }
    }
    processing.store(false, Ordering::SeqCst);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{ColorImage, ConfidenceMap, DepthMap, Resolution};
    use nalgebra::{Matrix3, Matrix4, Vector3};
    use std::sync::atomic::AtomicU64;

    fn config(root: &std::path::Path) -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.storage.root = Some(root.to_path_buf());
        config
    }

    fn frame(timestamp: f64, x: f32) -> PosedFrame {
        let mut transform = Matrix4::identity();
        transform[(0, 3)] = x;
        PosedFrame {
            timestamp,
            transform,
            intrinsics: Matrix3::new(554.0, 0.0, 320.0, 0.0, 554.0, 240.0, 0.0, 0.0, 1.0),
            projection: Matrix4::identity(),
            euler_angles: Vector3::zeros(),
            image_resolution: Resolution::new(640, 480),
            image: ColorImage {
                width: 8,
                height: 6,
                data: vec![90; 8 * 6 * 3],
            },
            depth: Some(DepthMap {
                width: 2,
                height: 2,
                data: vec![1.0; 4],
            }),
            confidence: Some(ConfidenceMap {
                width: 2,
                height: 2,
                data: vec![2; 4],
            }),
            feature_points: None,
            tracking_state: TrackingState::Normal,
            exposure: Default::default(),
            exif: Default::default(),
            fps: 60,
        }
    }

    #[tokio::test]
    async fn test_idle_pipeline_ignores_frames() {
        let root = tempfile::tempdir().unwrap();
        let mut pipeline = KeyframePipeline::new(config(root.path()));
        assert_eq!(pipeline.state(), SessionState::Idle);
        assert_eq!(pipeline.overlap_threshold(), 0.8);
        assert_eq!(
            pipeline.handle_frame(frame(0.0, 0.0)),
            FrameDecision::Ignored(IgnoreReason::NotActive)
        );
    }

    #[tokio::test]
    async fn test_start_sets_operating_threshold() {
        let root = tempfile::tempdir().unwrap();
        let mut pipeline = KeyframePipeline::new(config(root.path()));
        let session = pipeline.start().await.unwrap();
        assert_eq!(pipeline.overlap_threshold(), 0.9);
        assert_eq!(session.overlap_threshold(), 0.9);
        assert!(session.path().is_dir());
        pipeline.clear().await;
        assert!(!session.path().exists());
        assert_eq!(pipeline.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_admission_and_drop() {
        let root = tempfile::tempdir().unwrap();
        let mut pipeline = KeyframePipeline::new(config(root.path()));
        pipeline.start().await.unwrap();

        assert_eq!(
            pipeline.handle_frame(frame(0.0, 0.0)),
            FrameDecision::Admitted { index: 0 }
        );
        // 1 cm sideways at 1 m is nearly the same view
        assert!(matches!(
            pipeline.handle_frame(frame(0.1, 0.01)),
            FrameDecision::Dropped { method: OverlapMethod::FieldOfView, .. }
        ));
        // 2 m sideways leaves no overlap
        assert_eq!(
            pipeline.handle_frame(frame(0.2, 2.0)),
            FrameDecision::Admitted { index: 1 }
        );

        let mut limited = frame(0.3, 10.0);
        limited.tracking_state = TrackingState::Limited;
        assert_eq!(
            pipeline.handle_frame(limited),
            FrameDecision::Ignored(IgnoreReason::Tracking(TrackingState::Limited))
        );

        let summary = pipeline.stop(false, None).await.unwrap();
        assert_eq!(summary.exported, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.manifest.inputs.len(), 2);
        assert!(summary.archive.is_none());
        assert!(summary.directory.join("Image_000001.jpg").is_file());
    }

    #[tokio::test]
    async fn test_stop_drains_and_archives() {
        let root = tempfile::tempdir().unwrap();
        let mut pipeline = KeyframePipeline::new(config(root.path()));
        pipeline.start().await.unwrap();

        for i in 0..3 {
            pipeline.handle_frame(frame(i as f64, i as f32 * 3.0));
        }

        let last = Arc::new(AtomicU64::new(0));
        let seen = last.clone();
        let callback: ProgressCallback =
            Box::new(move |ratio: f64| seen.store(ratio.to_bits(), Ordering::SeqCst));

        let summary = pipeline.stop(true, Some(callback)).await.unwrap();
        assert_eq!(summary.exported, 3);
        let archive = summary.archive.unwrap();
        assert!(archive.is_file());
        assert!(!summary.directory.exists());
        assert_eq!(f64::from_bits(last.load(Ordering::SeqCst)), 1.0);
        assert_eq!(pipeline.state(), SessionState::Closed);
        assert_eq!(pipeline.overlap_threshold(), 0.8);

        assert_eq!(
            pipeline.handle_frame(frame(5.0, 0.0)),
            FrameDecision::Ignored(IgnoreReason::NotActive)
        );
    }

    #[tokio::test]
    async fn test_failed_export_does_not_halt_session() {
        let root = tempfile::tempdir().unwrap();
        let mut pipeline = KeyframePipeline::new(config(root.path()));
        pipeline.start().await.unwrap();

        let mut broken = frame(0.0, 0.0);
        broken.confidence = None;
        pipeline.handle_frame(broken);
        pipeline.handle_frame(frame(1.0, 5.0));
        pipeline.wait_idle().await;

        assert_eq!(pipeline.stats().failed(), 1);
        assert_eq!(pipeline.stats().exported(), 1);

        let summary = pipeline.stop(false, None).await.unwrap();
        // The photo of the failed keyframe is still recorded
        assert_eq!(summary.manifest.inputs.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_without_session() {
        let root = tempfile::tempdir().unwrap();
        let mut pipeline = KeyframePipeline::new(config(root.path()));
        assert!(matches!(
            pipeline.stop(false, None).await,
            Err(SessionError::NotActive)
        ));
    }

    #[tokio::test]
    async fn test_location_is_attached_to_keyframes() {
        let root = tempfile::tempdir().unwrap();
        let mut pipeline = KeyframePipeline::new(config(root.path()));
        let session = pipeline.start().await.unwrap();
        pipeline.set_location(LocationModel::new(48.85, 2.35, 35.0), None);
        pipeline.handle_frame(frame(0.0, 0.0));
        pipeline.wait_idle().await;

        let records = session.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata.gps_location.latitude, 48.85);
        pipeline.clear().await;
    }
}
