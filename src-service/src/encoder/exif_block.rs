//! EXIF APP1 payload builder.
//!
//! Produces `Exif\0\0` followed by a big-endian TIFF structure with IFD0, an
//! Exif sub-IFD and a GPS sub-IFD. Latitude and longitude are written as
//! zero placeholders of full size (three rationals each) so the patcher can
//! fill them in place after the file is written.

use crate::exif::patcher::{
    EXIF_MARKER, GPS_ALTITUDE_TAG, GPS_IFD_POINTER_TAG, GPS_LATITUDE_TAG, GPS_LONGITUDE_TAG,
};
use crate::exif::rational::{fraction, round_to};

const TAG_MAKE: u16 = 0x010F;
const TAG_MODEL: u16 = 0x0110;
const TAG_ORIENTATION: u16 = 0x0112;
const TAG_DATE_TIME: u16 = 0x0132;
const TAG_EXIF_IFD_POINTER: u16 = 0x8769;

const TAG_EXIF_VERSION: u16 = 0x9000;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TAG_SUBSEC_TIME_ORIGINAL: u16 = 0x9291;
const TAG_IMAGE_UNIQUE_ID: u16 = 0xA420;
const TAG_LENS_MODEL: u16 = 0xA434;

const TAG_GPS_VERSION_ID: u16 = 0x0000;
const TAG_GPS_LATITUDE_REF: u16 = 0x0001;
const TAG_GPS_LONGITUDE_REF: u16 = 0x0003;
const TAG_GPS_ALTITUDE_REF: u16 = 0x0005;

/// A TIFF field value.
#[derive(Debug, Clone)]
enum Value {
    Byte(Vec<u8>),
    Ascii(String),
    Short(u16),
    Long(u32),
    Rational(Vec<(u32, u32)>),
    Undefined(Vec<u8>),
}

impl Value {
    fn field_type(&self) -> u16 {
        match self {
            Value::Byte(_) => 1,
            Value::Ascii(_) => 2,
            Value::Short(_) => 3,
            Value::Long(_) => 4,
            Value::Rational(_) => 5,
            Value::Undefined(_) => 7,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Value::Byte(b) | Value::Undefined(b) => b.len() as u32,
            Value::Ascii(s) => s.len() as u32 + 1,
            Value::Short(_) | Value::Long(_) => 1,
            Value::Rational(r) => r.len() as u32,
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Value::Byte(b) | Value::Undefined(b) => b.clone(),
            Value::Ascii(s) => {
                let mut b = s.as_bytes().to_vec();
                b.push(0);
                b
            }
            Value::Short(v) => v.to_be_bytes().to_vec(),
            Value::Long(v) => v.to_be_bytes().to_vec(),
            Value::Rational(parts) => parts
                .iter()
                .flat_map(|(n, d)| n.to_be_bytes().into_iter().chain(d.to_be_bytes()))
                .collect(),
        }
    }
}

/// One image file directory. Entries are kept sorted by tag.
#[derive(Debug, Default)]
struct Ifd {
    entries: Vec<(u16, Value)>,
}

impl Ifd {
    fn push(&mut self, tag: u16, value: Value) {
        self.entries.push((tag, value));
        self.entries.sort_by_key(|(t, _)| *t);
    }

    fn set_long(&mut self, tag: u16, value: u32) {
        if let Some(entry) = self.entries.iter_mut().find(|(t, _)| *t == tag) {
            entry.1 = Value::Long(value);
        }
    }

    /// Bytes taken by the directory and its out-of-line values.
    fn byte_len(&self) -> usize {
        let data: usize = self
            .entries
            .iter()
            .map(|(_, v)| v.bytes().len())
            .filter(|len| *len > 4)
            .map(|len| len + len % 2)
            .sum();
        2 + 12 * self.entries.len() + 4 + data
    }

    /// Append this directory to `out`, which must start at the TIFF header.
    fn write(&self, out: &mut Vec<u8>) {
        let start = out.len();
        let mut data_offset = start + 2 + 12 * self.entries.len() + 4;
        let mut data = Vec::new();

        out.extend_from_slice(&(self.entries.len() as u16).to_be_bytes());
        for (tag, value) in &self.entries {
            let bytes = value.bytes();
            out.extend_from_slice(&tag.to_be_bytes());
            out.extend_from_slice(&value.field_type().to_be_bytes());
            out.extend_from_slice(&value.count().to_be_bytes());
            if bytes.len() <= 4 {
                let mut inline = [0u8; 4];
                inline[..bytes.len()].copy_from_slice(&bytes);
                out.extend_from_slice(&inline);
            } else {
                out.extend_from_slice(&(data_offset as u32).to_be_bytes());
                data.extend_from_slice(&bytes);
                if bytes.len() % 2 == 1 {
                    data.push(0);
                }
                data_offset += bytes.len() + bytes.len() % 2;
            }
        }
        // No next IFD
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&data);
    }
}

/// Values carried in the binary EXIF block of an exported photo.
#[derive(Debug, Clone)]
pub struct ExifFields {
    pub make: String,
    pub model: String,
    pub orientation: u16,
    /// `yyyy:MM:dd HH:mm:ss`
    pub date_time: String,
    pub subsec_time_original: Option<String>,
    pub image_unique_id: String,
    pub lens_model: String,
    /// 'N' or 'S'
    pub latitude_ref: char,
    /// 'E' or 'W'
    pub longitude_ref: char,
    /// Absolute altitude in metres
    pub altitude: f64,
    /// 0 above sea level, 1 below
    pub altitude_ref: u8,
}

fn altitude_rational(altitude: f64) -> (u32, u32) {
    let (num, den) = fraction(round_to(altitude.abs(), 5));
    match (u32::try_from(num), u32::try_from(den)) {
        (Ok(num), Ok(den)) => (num, den),
        _ => ((altitude.abs() * 100.0).round() as u32, 100),
    }
}

/// Build the APP1 payload (`Exif\0\0` + TIFF) for `fields`.
pub fn build_exif_payload(fields: &ExifFields) -> Vec<u8> {
    let mut ifd0 = Ifd::default();
    ifd0.push(TAG_MAKE, Value::Ascii(fields.make.clone()));
    ifd0.push(TAG_MODEL, Value::Ascii(fields.model.clone()));
    ifd0.push(TAG_ORIENTATION, Value::Short(fields.orientation));
    ifd0.push(TAG_DATE_TIME, Value::Ascii(fields.date_time.clone()));
    ifd0.push(TAG_EXIF_IFD_POINTER, Value::Long(0));
    ifd0.push(GPS_IFD_POINTER_TAG, Value::Long(0));

    let mut exif_ifd = Ifd::default();
    exif_ifd.push(TAG_EXIF_VERSION, Value::Undefined(b"0232".to_vec()));
    exif_ifd.push(TAG_DATE_TIME_ORIGINAL, Value::Ascii(fields.date_time.clone()));
    if let Some(subsec) = &fields.subsec_time_original {
        exif_ifd.push(TAG_SUBSEC_TIME_ORIGINAL, Value::Ascii(subsec.clone()));
    }
    exif_ifd.push(TAG_IMAGE_UNIQUE_ID, Value::Ascii(fields.image_unique_id.clone()));
    exif_ifd.push(TAG_LENS_MODEL, Value::Ascii(fields.lens_model.clone()));

    let placeholder = Value::Rational(vec![(0, 1), (0, 1), (0, 1)]);
    let mut gps_ifd = Ifd::default();
    gps_ifd.push(TAG_GPS_VERSION_ID, Value::Byte(vec![2, 3, 0, 0]));
    gps_ifd.push(TAG_GPS_LATITUDE_REF, Value::Ascii(fields.latitude_ref.to_string()));
    gps_ifd.push(GPS_LATITUDE_TAG, placeholder.clone());
    gps_ifd.push(TAG_GPS_LONGITUDE_REF, Value::Ascii(fields.longitude_ref.to_string()));
    gps_ifd.push(GPS_LONGITUDE_TAG, placeholder);
    gps_ifd.push(TAG_GPS_ALTITUDE_REF, Value::Byte(vec![fields.altitude_ref]));
    gps_ifd.push(
        GPS_ALTITUDE_TAG,
        Value::Rational(vec![altitude_rational(fields.altitude)]),
    );

    let exif_offset = 8 + ifd0.byte_len();
    let gps_offset = exif_offset + exif_ifd.byte_len();
    ifd0.set_long(TAG_EXIF_IFD_POINTER, exif_offset as u32);
    ifd0.set_long(GPS_IFD_POINTER_TAG, gps_offset as u32);

    let mut tiff = Vec::with_capacity(gps_offset + gps_ifd.byte_len());
    tiff.extend_from_slice(b"MM");
    tiff.extend_from_slice(&42u16.to_be_bytes());
    tiff.extend_from_slice(&8u32.to_be_bytes());
    ifd0.write(&mut tiff);
    exif_ifd.write(&mut tiff);
    gps_ifd.write(&mut tiff);

    let mut payload = EXIF_MARKER.to_vec();
    payload.extend_from_slice(&tiff);
    payload
}
