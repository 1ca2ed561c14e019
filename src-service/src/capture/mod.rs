//! Frame types, keyframe records and frame sources.

pub mod metadata;
pub mod source;
pub mod types;

pub use metadata::{
    confidence_map_file_name, depth_map_file_name, image_file_name, random_digits, random_hex_id,
    random_uuid, rotate_matrix, view_matrix, ArtifactNames, EulerAngles, FrameCacheEntry,
    FrameMetadata,
};
pub use source::{FrameSource, RecordedFrames, SourceFrame};
pub use types::{
    ColorImage, ConfidenceMap, DepthMap, DisplayOrientation, ExposureInfo, PosedFrame, Resolution,
    TrackingState,
};
