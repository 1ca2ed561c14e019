//! Depth and confidence map export as uncompressed single-channel TIFF.
//!
//! Depth maps are 32-bit float metres, confidence maps 8-bit levels 0-2.
//! Each file carries an XMP packet in tag 700.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use chrono::{DateTime, Local};
use tiff::encoder::{colortype, Rational, TiffEncoder, TiffValue};
use tiff::tags::{ResolutionUnit, Tag};

use super::xmp::{tags, XmpMetadata};
use crate::capture::{ConfidenceMap, DepthMap};
use crate::error::ExportError;

/// TIFF tag holding an XMP packet.
pub const XMP_TAG: u16 = 700;

const MAP_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIFF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Which auxiliary map is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapKind {
    Depth,
    Confidence,
}

impl MapKind {
    pub fn brand_name(&self) -> &'static str {
        match self {
            MapKind::Depth => "Depth",
            MapKind::Confidence => "DepthConfidence",
        }
    }
}

/// Tag set shared by depth and confidence maps.
pub fn map_metadata(
    kind: MapKind,
    capture_id: &str,
    make: &str,
    model: &str,
    now: &DateTime<Local>,
) -> XmpMetadata {
    let date = now.format(MAP_DATE_FORMAT).to_string();
    let mut metadata = XmpMetadata::new();

    metadata.set(tags::MODEL, model);
    metadata.set(tags::MAKE, make);
    metadata.set(tags::BRAND_NAME, kind.brand_name());
    if kind == MapKind::Depth {
        metadata.set(tags::DEPTH_UNIT, "m");
    }
    metadata.set(tags::DEPTH_CONFIDENCE_RANGE_MIN, "0");
    metadata.set(tags::DEPTH_CONFIDENCE_RANGE_MAX, "2");
    metadata.set(tags::DEPTH_CONFIDENCE_UNIT, "int");
    metadata.set(tags::CAPTURE_UUID, capture_id);

    metadata.set(tags::DATE_TIME_ORIGINAL, date.clone());
    metadata.set(tags::PHOTOSHOP_DATE_CREATED, date.clone());
    metadata.set(tags::PHOTOSHOP_DATE_TIME_ORIGINAL, date);

    metadata.set(tags::ORIENTATION, "1");
    metadata.set(tags::PHOTOMETRIC_INTERPRETATION, "1");
    metadata.set(tags::COMPRESSION, "1");
    metadata.set(tags::RESOLUTION_UNIT, "2");
    metadata
}

#[allow(clippy::too_many_arguments)]
fn write_gray<C>(
    path: &Path,
    width: u32,
    height: u32,
    data: &[C::Inner],
    metadata: &XmpMetadata,
    make: &str,
    model: &str,
    now: &DateTime<Local>,
) -> Result<(), ExportError>
where
    C: colortype::ColorType,
    [C::Inner]: TiffValue,
{
    let packet = metadata.to_packet();
    let date = now.format(TIFF_DATE_FORMAT).to_string();

    let file = BufWriter::new(File::create(path)?);
    let mut encoder = TiffEncoder::new(file)?;
    let mut image = encoder.new_image::<C>(width, height)?;

    image.encoder().write_tag(Tag::Make, make)?;
    image.encoder().write_tag(Tag::Model, model)?;
    image.encoder().write_tag(Tag::Orientation, 1u16)?;
    image.encoder().write_tag(Tag::DateTime, date.as_str())?;
    image
        .encoder()
        .write_tag(Tag::Unknown(XMP_TAG), packet.as_bytes())?;
    image.resolution(ResolutionUnit::Inch, Rational { n: 72, d: 1 });

    image.write_data(data)?;
    Ok(())
}

/// Write a depth map as a 32-bit float TIFF.
pub fn write_depth_map(
    path: &Path,
    depth: &DepthMap,
    capture_id: &str,
    make: &str,
    model: &str,
) -> Result<(), ExportError> {
    depth.validate()?;
    let now = Local::now();
    let metadata = map_metadata(MapKind::Depth, capture_id, make, model, &now);
    write_gray::<colortype::Gray32Float>(
        path,
        depth.width,
        depth.height,
        &depth.data,
        &metadata,
        make,
        model,
        &now,
    )
}

/// Write a confidence map as an 8-bit TIFF.
pub fn write_confidence_map(
    path: &Path,
    confidence: &ConfidenceMap,
    capture_id: &str,
    make: &str,
    model: &str,
) -> Result<(), ExportError> {
    confidence.validate()?;
    let now = Local::now();
    let metadata = map_metadata(MapKind::Confidence, capture_id, make, model, &now);
    write_gray::<colortype::Gray8>(
        path,
        confidence.width,
        confidence.height,
        &confidence.data,
        &metadata,
        make,
        model,
        &now,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiff::decoder::{Decoder, DecodingResult};

    fn contains(haystack: &[u8], needle: &str) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w == needle.as_bytes())
    }

    #[test]
    fn test_depth_metadata() {
        let now = Local::now();
        let metadata = map_metadata(MapKind::Depth, "id", "Apple", "photocap.iPhone", &now);
        assert_eq!(metadata.get(tags::BRAND_NAME), Some("Depth"));
        assert_eq!(metadata.get(tags::DEPTH_UNIT), Some("m"));
        assert_eq!(metadata.get(tags::DEPTH_CONFIDENCE_RANGE_MAX), Some("2"));
        assert_eq!(metadata.get(tags::ORIENTATION), Some("1"));
    }

    #[test]
    fn test_confidence_metadata_has_no_unit() {
        let now = Local::now();
        let metadata = map_metadata(MapKind::Confidence, "id", "Apple", "photocap.iPhone", &now);
        assert_eq!(metadata.get(tags::BRAND_NAME), Some("DepthConfidence"));
        assert_eq!(metadata.get(tags::DEPTH_UNIT), None);
        assert_eq!(metadata.get(tags::DEPTH_CONFIDENCE_UNIT), Some("int"));
    }

    #[test]
    fn test_write_depth_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DepthMap_000000.tiff");
        let depth = DepthMap {
            width: 3,
            height: 2,
            data: vec![0.5, 1.0, 1.5, 2.0, 2.5, 3.0],
        };
        write_depth_map(&path, &depth, "feed", "Apple", "photocap.iPhone").unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(decoder.dimensions().unwrap(), (3, 2));
        match decoder.read_image().unwrap() {
            DecodingResult::F32(values) => assert_eq!(values, depth.data),
            _ => panic!("expected f32 samples"),
        }

        let bytes = std::fs::read(&path).unwrap();
        assert!(contains(&bytes, "<Camera:BrandName>Depth</Camera:BrandName>"));
        assert!(contains(&bytes, "<Camera:CaptureUUID>feed</Camera:CaptureUUID>"));
    }

    #[test]
    fn test_write_confidence_map() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Confidence_000000.tiff");
        let confidence = ConfidenceMap {
            width: 2,
            height: 2,
            data: vec![0, 1, 2, 2],
        };
        write_confidence_map(&path, &confidence, "feed", "Apple", "photocap.iPhone").unwrap();

        let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
        match decoder.read_image().unwrap() {
            DecodingResult::U8(values) => assert_eq!(values, confidence.data),
            _ => panic!("expected u8 samples"),
        }
        let bytes = std::fs::read(&path).unwrap();
        assert!(contains(&bytes, "DepthConfidence"));
    }

    #[test]
    fn test_rejects_mismatched_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let depth = DepthMap {
            width: 4,
            height: 4,
            data: vec![1.0; 3],
        };
        let result = write_depth_map(&dir.path().join("bad.tiff"), &depth, "id", "a", "b");
        assert!(matches!(result, Err(ExportError::InvalidBuffer(_))));
    }
}
