//! In-place GPS patching of the EXIF block in an encoded photo.
//!
//! The encoder allocates GPS latitude/longitude slots with placeholder values.
//! Once the file is written, these functions locate the slots by walking the
//! EXIF directory structure and overwrite the 24-byte rational triples. The
//! file length never changes.

use std::path::Path;

use super::rational::{degrees_to_rational, Dms, Rational};
use super::reader::FileDataReader;
use super::writer::FileDataWriter;
use crate::error::PatchError;

/// Identifier that precedes the TIFF header inside an APP1 segment.
pub const EXIF_MARKER: [u8; 6] = [0x45, 0x78, 0x69, 0x66, 0x00, 0x00];

/// IFD0 tag pointing at the GPS sub-directory.
pub const GPS_IFD_POINTER_TAG: u16 = 0x8825;
pub const GPS_LATITUDE_TAG: u16 = 0x0002;
pub const GPS_LONGITUDE_TAG: u16 = 0x0004;
pub const GPS_ALTITUDE_TAG: u16 = 0x0006;

/// Size of one IFD entry in bytes.
pub const DIRECTORY_ENTRY_SIZE: usize = 12;

/// Size of a degree/minute/second coordinate payload.
pub const COORDINATE_PAYLOAD_SIZE: usize = 24;

/// Byte order declared by a TIFF header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    /// "MM"
    BigEndian,
    /// "II"
    LittleEndian,
}

impl ByteOrder {
    pub fn u16(&self, bytes: &[u8]) -> u16 {
        let word = [bytes[0], bytes[1]];
        match self {
            ByteOrder::BigEndian => u16::from_be_bytes(word),
            ByteOrder::LittleEndian => u16::from_le_bytes(word),
        }
    }

    pub fn u32(&self, bytes: &[u8]) -> u32 {
        let word = [bytes[0], bytes[1], bytes[2], bytes[3]];
        match self {
            ByteOrder::BigEndian => u32::from_be_bytes(word),
            ByteOrder::LittleEndian => u32::from_le_bytes(word),
        }
    }

    fn i32_bytes(&self, value: i32) -> [u8; 4] {
        match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        }
    }

    /// Encode a coordinate as three SRATIONAL-layout pairs.
    pub fn encode_dms(&self, dms: &Dms) -> [u8; COORDINATE_PAYLOAD_SIZE] {
        let mut out = [0u8; COORDINATE_PAYLOAD_SIZE];
        let parts = [dms.degrees, dms.minutes, dms.seconds];
        for (i, part) in parts.iter().enumerate() {
            out[i * 8..i * 8 + 4].copy_from_slice(&self.i32_bytes(part.num));
            out[i * 8 + 4..i * 8 + 8].copy_from_slice(&self.i32_bytes(part.den));
        }
        out
    }

    /// Decode a coordinate payload written by [`ByteOrder::encode_dms`].
    pub fn decode_dms(&self, bytes: &[u8]) -> Dms {
        let read = |at: usize| self.u32(&bytes[at..at + 4]) as i32;
        Dms {
            degrees: Rational::new(read(0), read(4)),
            minutes: Rational::new(read(8), read(12)),
            seconds: Rational::new(read(16), read(20)),
        }
    }
}

/// Find the first offset at or after `start` where `pattern` occurs.
pub fn find_byte_sequence(
    reader: &mut FileDataReader,
    start: usize,
    pattern: &[u8],
) -> Result<Option<usize>, PatchError> {
    if pattern.is_empty() || pattern.len() > reader.size() {
        return Ok(None);
    }
    let last = reader.size() - pattern.len();
    for offset in start..=last {
        let mut matched = true;
        for (i, expected) in pattern.iter().enumerate() {
            if reader.get(offset + i)? != *expected {
                matched = false;
                break;
            }
        }
        if matched {
            return Ok(Some(offset));
        }
    }
    Ok(None)
}

/// Size in bytes of one value of a TIFF field type, 0 for unknown types.
pub fn type_size(field_type: u16) -> usize {
    match field_type {
        1 | 2 | 7 => 1,
        3 => 2,
        4 | 9 => 4,
        5 | 10 => 8,
        _ => 0,
    }
}

/// One decoded 12-byte IFD entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub tag: u16,
    pub field_type: u16,
    pub count: u32,
    /// Absolute file offset of the value, `None` when the value is stored inline.
    pub value_offset: Option<usize>,
    /// The inline 4 bytes, or the out-of-line value bytes.
    pub value: Vec<u8>,
}

/// Decode the IFD entry at `offset`. Out-of-line offsets are relative to `base`.
pub fn read_directory_entry(
    reader: &mut FileDataReader,
    offset: usize,
    base: usize,
    order: ByteOrder,
) -> Result<DirectoryEntry, PatchError> {
    let raw = reader.get_range(offset, offset + DIRECTORY_ENTRY_SIZE)?.to_vec();

    let tag = order.u16(&raw[0..2]);
    let field_type = order.u16(&raw[2..4]);
    let count = order.u32(&raw[4..8]);
    let inline = raw[8..12].to_vec();

    let size = type_size(field_type) * count as usize;
    if size <= 4 {
        return Ok(DirectoryEntry {
            tag,
            field_type,
            count,
            value_offset: None,
            value: inline,
        });
    }

    let value_offset = base + order.u32(&inline) as usize;
    let value = reader.get_range(value_offset, value_offset + size)?.to_vec();
    Ok(DirectoryEntry {
        tag,
        field_type,
        count,
        value_offset: Some(value_offset),
        value,
    })
}

/// Absolute file offsets of the GPS value payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpsInfoOffsets {
    pub byte_order: ByteOrder,
    pub latitude: Option<usize>,
    pub longitude: Option<usize>,
    pub altitude: Option<usize>,
}

fn is_coordinate_slot(entry: &DirectoryEntry) -> bool {
    matches!(entry.field_type, 5 | 10) && entry.count == 3
}

/// Walk IFD0 to the GPS sub-directory and record where its values live.
pub fn locate_gps_info(reader: &mut FileDataReader) -> Result<GpsInfoOffsets, PatchError> {
    let marker = find_byte_sequence(reader, 0, &EXIF_MARKER)?
        .ok_or(PatchError::MarkerNotFound("Exif"))?;
    let base = marker + EXIF_MARKER.len();

    let header = reader.get_range(base, base + 8)?.to_vec();
    let order = match &header[0..2] {
        b"MM" => ByteOrder::BigEndian,
        b"II" => ByteOrder::LittleEndian,
        other => {
            return Err(PatchError::InvalidHeader(format!(
                "unknown byte order {:02x}{:02x}",
                other[0], other[1]
            )))
        }
    };
    if order.u16(&header[2..4]) != 42 {
        return Err(PatchError::InvalidHeader("bad TIFF magic".to_string()));
    }

    let mut offsets = GpsInfoOffsets {
        byte_order: order,
        latitude: None,
        longitude: None,
        altitude: None,
    };

    let ifd0 = base + order.u32(&header[4..8]) as usize;
    let entries = order.u16(reader.get_range(ifd0, ifd0 + 2)?) as usize;

    for i in 0..entries {
        let entry =
            read_directory_entry(reader, ifd0 + 2 + i * DIRECTORY_ENTRY_SIZE, base, order)?;
        if entry.tag != GPS_IFD_POINTER_TAG {
            continue;
        }

        let gps_ifd = base + order.u32(&entry.value) as usize;
        let gps_entries = order.u16(reader.get_range(gps_ifd, gps_ifd + 2)?) as usize;
        for j in 0..gps_entries {
            let gps_entry =
                read_directory_entry(reader, gps_ifd + 2 + j * DIRECTORY_ENTRY_SIZE, base, order)?;
            match gps_entry.tag {
                GPS_LATITUDE_TAG if is_coordinate_slot(&gps_entry) => {
                    offsets.latitude = gps_entry.value_offset
                }
                GPS_LONGITUDE_TAG if is_coordinate_slot(&gps_entry) => {
                    offsets.longitude = gps_entry.value_offset
                }
                GPS_ALTITUDE_TAG => offsets.altitude = gps_entry.value_offset,
                _ => {}
            }
        }
        break;
    }

    Ok(offsets)
}

/// Overwrite the GPS latitude and longitude of the photo at `path`.
///
/// Values are decimal degrees; callers pass absolute values and carry the
/// hemisphere in the reference tags. Missing slots are skipped independently.
pub fn patch_gps_coordinates(
    path: &Path,
    latitude: f64,
    longitude: f64,
) -> Result<GpsInfoOffsets, PatchError> {
    let offsets = {
        let mut reader = FileDataReader::open(path)?;
        locate_gps_info(&mut reader)?
    };
    let writer = FileDataWriter::new(path);
    let order = offsets.byte_order;

    if let Some(offset) = offsets.latitude {
        writer.write(offset, &order.encode_dms(&degrees_to_rational(latitude)))?;
    } else {
        tracing::debug!("No GPS latitude slot in {:?}", path);
    }
    if let Some(offset) = offsets.longitude {
        writer.write(offset, &order.encode_dms(&degrees_to_rational(longitude)))?;
    } else {
        tracing::debug!("No GPS longitude slot in {:?}", path);
    }

    Ok(offsets)
}

/// Coordinates currently stored in a photo's GPS slots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsCoordinates {
    pub latitude: Option<Dms>,
    pub longitude: Option<Dms>,
}

/// Read back the GPS latitude and longitude payloads.
pub fn read_gps_coordinates(path: &Path) -> Result<GpsCoordinates, PatchError> {
    let mut reader = FileDataReader::open(path)?;
    let offsets = locate_gps_info(&mut reader)?;
    let order = offsets.byte_order;

    let mut read_slot = |offset: Option<usize>| -> Result<Option<Dms>, PatchError> {
        match offset {
            Some(at) => {
                let bytes = reader.get_range(at, at + COORDINATE_PAYLOAD_SIZE)?;
                Ok(Some(order.decode_dms(bytes)))
            }
            None => Ok(None),
        }
    };

    Ok(GpsCoordinates {
        latitude: read_slot(offsets.latitude)?,
        longitude: read_slot(offsets.longitude)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Minimal JPEG-like file: SOI, APP1 with a big-endian TIFF holding
    /// IFD0 -> GPS IFD with latitude, longitude and altitude slots, then EOI.
    fn synthetic_photo(with_gps_pointer: bool) -> Vec<u8> {
        let mut tiff = Vec::new();
        tiff.extend_from_slice(b"MM");
        tiff.extend_from_slice(&42u16.to_be_bytes());
        tiff.extend_from_slice(&8u32.to_be_bytes());

        // IFD0 at 8: two entries
        tiff.extend_from_slice(&2u16.to_be_bytes());
        // Orientation SHORT inline
        tiff.extend_from_slice(&0x0112u16.to_be_bytes());
        tiff.extend_from_slice(&3u16.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&[0, 6, 0, 0]);
        // GPS pointer LONG -> 38
        let pointer_tag: u16 = if with_gps_pointer { 0x8825 } else { 0x8769 };
        tiff.extend_from_slice(&pointer_tag.to_be_bytes());
        tiff.extend_from_slice(&4u16.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&38u32.to_be_bytes());
        tiff.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(tiff.len(), 38);

        // GPS IFD at 38: three entries, values follow at 38 + 2 + 36 + 4 = 80
        tiff.extend_from_slice(&3u16.to_be_bytes());
        for (tag, count, value_at) in [(0x0002u16, 3u32, 80u32), (0x0004, 3, 104), (0x0006, 1, 128)] {
            tiff.extend_from_slice(&tag.to_be_bytes());
            tiff.extend_from_slice(&5u16.to_be_bytes());
            tiff.extend_from_slice(&count.to_be_bytes());
            tiff.extend_from_slice(&value_at.to_be_bytes());
        }
        tiff.extend_from_slice(&0u32.to_be_bytes());
        assert_eq!(tiff.len(), 80);
        tiff.extend_from_slice(&[0u8; 56]);

        let mut file = vec![0xFF, 0xD8, 0xFF, 0xE1];
        let len = (2 + EXIF_MARKER.len() + tiff.len()) as u16;
        file.extend_from_slice(&len.to_be_bytes());
        file.extend_from_slice(&EXIF_MARKER);
        file.extend_from_slice(&tiff);
        file.extend_from_slice(&[0xFF, 0xD9]);
        file
    }

    fn write_photo(bytes: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn test_find_byte_sequence() {
        let (_dir, path) = write_photo(b"xxExif\0\0yy");
        let mut reader = FileDataReader::open(&path).unwrap();
        assert_eq!(find_byte_sequence(&mut reader, 0, &EXIF_MARKER).unwrap(), Some(2));
        assert_eq!(find_byte_sequence(&mut reader, 3, &EXIF_MARKER).unwrap(), None);
        assert_eq!(find_byte_sequence(&mut reader, 0, b"yy").unwrap(), Some(8));
    }

    #[test]
    fn test_type_sizes() {
        assert_eq!(type_size(1), 1);
        assert_eq!(type_size(2), 1);
        assert_eq!(type_size(3), 2);
        assert_eq!(type_size(4), 4);
        assert_eq!(type_size(5), 8);
        assert_eq!(type_size(7), 1);
        assert_eq!(type_size(9), 4);
        assert_eq!(type_size(10), 8);
        assert_eq!(type_size(11), 0);
    }

    #[test]
    fn test_inline_entry_has_no_offset() {
        let bytes = synthetic_photo(true);
        let (_dir, path) = write_photo(&bytes);
        let mut reader = FileDataReader::open(&path).unwrap();

        // SOI(2) + marker(2) + length(2) + "Exif\0\0"(6) = TIFF base at 12; IFD0 entries at 12 + 10
        let entry = read_directory_entry(&mut reader, 22, 12, ByteOrder::BigEndian).unwrap();
        assert_eq!(entry.tag, 0x0112);
        assert_eq!(entry.field_type, 3);
        assert_eq!(entry.value_offset, None);
        assert_eq!(entry.value, vec![0, 6, 0, 0]);
    }

    #[test]
    fn test_out_of_line_entry_reads_from_base_relative_offset() {
        let mut bytes = synthetic_photo(true);
        let payload: Vec<u8> = (1..=24).collect();
        bytes[12 + 80..12 + 104].copy_from_slice(&payload);
        let (_dir, path) = write_photo(&bytes);
        let mut reader = FileDataReader::open(&path).unwrap();

        // First GPS IFD entry sits after the 2-byte count at TIFF offset 38
        let entry = read_directory_entry(&mut reader, 12 + 40, 12, ByteOrder::BigEndian).unwrap();
        assert_eq!(entry.tag, 0x0002);
        assert_eq!(entry.field_type, 5);
        assert_eq!(entry.count, 3);
        assert_eq!(entry.value_offset, Some(12 + 80));
        assert_eq!(entry.value, payload);
    }

    #[test]
    fn test_locate_gps_info() {
        let bytes = synthetic_photo(true);
        let (_dir, path) = write_photo(&bytes);
        let mut reader = FileDataReader::open(&path).unwrap();

        let offsets = locate_gps_info(&mut reader).unwrap();
        assert_eq!(offsets.byte_order, ByteOrder::BigEndian);
        assert_eq!(offsets.latitude, Some(12 + 80));
        assert_eq!(offsets.longitude, Some(12 + 104));
        assert_eq!(offsets.altitude, Some(12 + 128));
    }

    #[test]
    fn test_patch_writes_exact_bytes_without_resizing() {
        let bytes = synthetic_photo(true);
        let (_dir, path) = write_photo(&bytes);

        patch_gps_coordinates(&path, 37.422, 122.084).unwrap();

        let patched = std::fs::read(&path).unwrap();
        assert_eq!(patched.len(), bytes.len());

        let lat_at = 12 + 80;
        let expected = ByteOrder::BigEndian.encode_dms(&Dms {
            degrees: Rational::new(37, 1),
            minutes: Rational::new(25, 1),
            seconds: Rational::new(96, 5),
        });
        assert_eq!(&patched[lat_at..lat_at + 24], &expected);

        // Everything outside the two slots is untouched
        assert_eq!(&patched[..lat_at], &bytes[..lat_at]);
        assert_eq!(&patched[12 + 128..], &bytes[12 + 128..]);
    }

    #[test]
    fn test_patch_is_idempotent() {
        let bytes = synthetic_photo(true);
        let (_dir, path) = write_photo(&bytes);

        patch_gps_coordinates(&path, 51.5007292, 0.1246254).unwrap();
        let first = std::fs::read(&path).unwrap();
        patch_gps_coordinates(&path, 51.5007292, 0.1246254).unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_read_back_coordinates() {
        let bytes = synthetic_photo(true);
        let (_dir, path) = write_photo(&bytes);
        patch_gps_coordinates(&path, 48.8583701, 2.2944813).unwrap();

        let coords = read_gps_coordinates(&path).unwrap();
        assert_abs_diff_eq!(coords.latitude.unwrap().to_degrees(), 48.8583701, epsilon = 1e-6);
        assert_abs_diff_eq!(coords.longitude.unwrap().to_degrees(), 2.2944813, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_gps_directory_is_noop() {
        let bytes = synthetic_photo(false);
        let (_dir, path) = write_photo(&bytes);

        let offsets = patch_gps_coordinates(&path, 10.0, 20.0).unwrap();
        assert!(offsets.latitude.is_none());
        assert!(offsets.longitude.is_none());
        assert_eq!(std::fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn test_missing_exif_marker() {
        let (_dir, path) = write_photo(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(matches!(
            patch_gps_coordinates(&path, 1.0, 2.0),
            Err(PatchError::MarkerNotFound("Exif"))
        ));
    }
}
