//! Artifact encoders: keyframe photo, depth and confidence maps, and their metadata.

pub mod exif_block;
pub mod jpeg;
pub mod maps;
pub mod xmp;

pub use exif_block::{build_exif_payload, ExifFields};
pub use jpeg::{encode_rgb, insert_metadata_segments, JpegPhoto, PHOTO_ORIENTATION};
pub use maps::{map_metadata, write_confidence_map, write_depth_map, MapKind};
pub use xmp::{decimal, tags, XmpMetadata};
