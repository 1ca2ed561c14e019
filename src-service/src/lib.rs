//! photocap service
//!
//! Turns a stream of posed camera frames into a photogrammetry dataset:
//! keyframes are selected by view overlap, each keyframe is exported as a
//! geotagged JPEG plus depth and confidence TIFFs, and a finished session is
//! written out with a manifest and pose log and optionally zipped.

pub mod capture;
pub mod config;
pub mod encoder;
pub mod error;
pub mod exif;
pub mod exporter;
pub mod overlap;
pub mod pipeline;
pub mod queue;
pub mod session;

pub use config::PipelineConfig;
pub use error::{ExportError, PatchError, SessionError, SourceError};
pub use exporter::ArtifactExporter;
pub use pipeline::{FrameDecision, IgnoreReason, KeyframePipeline, ProgressCallback, SessionSummary};
pub use queue::FrameQueue;
pub use session::CaptureSession;
