//! Keyframe photo export.
//!
//! A photo is written in two passes. [`JpegPhoto::create`] encodes the pixels
//! and writes the file. The setters then accumulate tags, and
//! [`JpegPhoto::export`] rewrites the container with an EXIF block (GPS slots
//! allocated as placeholders) plus an XMP packet, then patches the true GPS
//! coordinates into the written bytes.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops::FilterType, ImageBuffer, Rgb};
use photocap_common::LocationModel;
use tracing::debug;

use super::exif_block::{build_exif_payload, ExifFields};
use super::xmp::{decimal, tags, XmpMetadata};
use crate::capture::{random_digits, ColorImage, EulerAngles};
use crate::error::ExportError;
use crate::exif::{fraction_string, patch_gps_coordinates, round_to};

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP0: u8 = 0xE0;
const APP1: u8 = 0xE1;
const XMP_IDENTIFIER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const EXIF_IDENTIFIER: &[u8] = b"Exif\0\0";
const MAX_SEGMENT_PAYLOAD: usize = 65533;

/// Orientation written on exported photos (rotated 90° clockwise).
pub const PHOTO_ORIENTATION: u16 = 6;

const PHOTO_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";
const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Scale `(width, height)` so the long edge is at most `max_long_edge`.
fn scaled_dimensions(width: u32, height: u32, max_long_edge: Option<u32>) -> (u32, u32) {
    let Some(max) = max_long_edge else {
        return (width, height);
    };
    let long_edge = width.max(height);
    if long_edge <= max || long_edge == 0 {
        return (width, height);
    }
    let scale = max as f64 / long_edge as f64;
    (
        ((width as f64 * scale).round() as u32).max(1),
        ((height as f64 * scale).round() as u32).max(1),
    )
}

/// Encode an RGB image as JPEG, downscaling when its long edge exceeds `max_long_edge`.
pub fn encode_rgb(
    image: &ColorImage,
    quality: u8,
    max_long_edge: Option<u32>,
) -> Result<Vec<u8>, ExportError> {
    image.validate()?;

    let img: ImageBuffer<Rgb<u8>, Vec<u8>> =
        ImageBuffer::from_raw(image.width, image.height, image.data.clone())
            .ok_or_else(|| ExportError::InvalidBuffer("Failed to create image buffer".to_string()))?;

    let (width, height) = scaled_dimensions(image.width, image.height, max_long_edge);
    let img = if (width, height) != (image.width, image.height) {
        image::imageops::resize(&img, width, height, FilterType::Triangle)
    } else {
        img
    };

    let mut jpeg_bytes: Vec<u8> = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg_bytes, quality.clamp(1, 100));
    encoder.encode_image(&img)?;
    Ok(jpeg_bytes)
}

fn segment(marker: u8, identifier: &[u8], payload: &[u8]) -> Result<Vec<u8>, ExportError> {
    let len = identifier.len() + payload.len();
    if len > MAX_SEGMENT_PAYLOAD {
        return Err(ExportError::Encode(format!(
            "metadata segment too large: {} bytes",
            len
        )));
    }
    let mut out = Vec::with_capacity(len + 4);
    out.extend_from_slice(&[0xFF, marker]);
    out.extend_from_slice(&((len + 2) as u16).to_be_bytes());
    out.extend_from_slice(identifier);
    out.extend_from_slice(payload);
    Ok(out)
}

/// Replace the EXIF and XMP segments of a JPEG stream.
///
/// Existing EXIF/XMP APP1 segments are dropped. The new EXIF segment is
/// placed right after SOI and any APP0 (JFIF) segment, followed by the XMP
/// segment. All other bytes are carried over unchanged.
pub fn insert_metadata_segments(
    jpeg: &[u8],
    exif_payload: &[u8],
    xmp_packet: &[u8],
) -> Result<Vec<u8>, ExportError> {
    if jpeg.len() < 4 || jpeg[0..2] != SOI {
        return Err(ExportError::Encode("not a JPEG stream".to_string()));
    }

    let mut app0 = Vec::new();
    let mut other_app = Vec::new();
    let mut pos = 2;

    while pos + 4 <= jpeg.len() && jpeg[pos] == 0xFF && (0xE0..=0xEF).contains(&jpeg[pos + 1]) {
        let marker = jpeg[pos + 1];
        let len = u16::from_be_bytes([jpeg[pos + 2], jpeg[pos + 3]]) as usize;
        let end = pos + 2 + len;
        if len < 2 || end > jpeg.len() {
            return Err(ExportError::Encode(format!(
                "truncated APP segment at offset {}",
                pos
            )));
        }
        let body = &jpeg[pos + 4..end];
        let replaced =
            marker == APP1 && (body.starts_with(EXIF_IDENTIFIER) || body.starts_with(XMP_IDENTIFIER));
        if !replaced {
            if marker == APP0 {
                app0.extend_from_slice(&jpeg[pos..end]);
            } else {
                other_app.extend_from_slice(&jpeg[pos..end]);
            }
        }
        pos = end;
    }

    let mut out = Vec::with_capacity(jpeg.len() + exif_payload.len() + xmp_packet.len() + 8);
    out.extend_from_slice(&SOI);
    out.extend_from_slice(&app0);
    out.extend_from_slice(&segment(APP1, &[], exif_payload)?);
    out.extend_from_slice(&segment(APP1, XMP_IDENTIFIER, xmp_packet)?);
    out.extend_from_slice(&other_app);
    out.extend_from_slice(&jpeg[pos..]);
    Ok(out)
}

/// A written keyframe photo awaiting its metadata pass.
#[derive(Debug)]
pub struct JpegPhoto {
    path: PathBuf,
    make: String,
    model: String,
    subsec_time_original: Option<String>,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    is_rtk: bool,
    metadata: XmpMetadata,
}

impl JpegPhoto {
    /// Encode `image` and write it to `path`.
    pub fn create(
        path: &Path,
        image: &ColorImage,
        quality: u8,
        max_long_edge: Option<u32>,
        capture_id: &str,
        make: &str,
        model: &str,
    ) -> Result<Self, ExportError> {
        let jpeg = encode_rgb(image, quality, max_long_edge)?;
        fs::write(path, &jpeg)?;

        let mut metadata = XmpMetadata::new();
        metadata.set(tags::MODEL, model);
        metadata.set(tags::MAKE, make);
        metadata.set(tags::CAPTURE_UUID, capture_id);

        Ok(Self {
            path: path.to_path_buf(),
            make: make.to_string(),
            model: model.to_string(),
            subsec_time_original: None,
            latitude: 0.0,
            longitude: 0.0,
            altitude: 0.0,
            is_rtk: false,
            metadata,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &XmpMetadata {
        &self.metadata
    }

    pub fn is_rtk(&self) -> bool {
        self.is_rtk
    }

    pub fn set_subsec_time_original(&mut self, time: Option<&str>) {
        if let Some(time) = time {
            self.metadata.set(tags::SUBSEC_TIME_ORIGINAL, time);
            self.subsec_time_original = Some(time.to_string());
        }
    }

    /// Horizontal coordinate system label; the vertical system is always ellipsoidal.
    pub fn set_coordinate(&mut self, coordinate: &str) {
        self.metadata.set(tags::HORIZ_CS, coordinate);
        self.metadata.set(tags::VERT_CS, "ellipsoidal");
    }

    pub fn set_rtk_location(
        &mut self,
        location: &LocationModel,
        rtk_id: Option<&str>,
        rtk_serial_number: Option<&str>,
    ) {
        self.metadata.set(tags::RTK_ALTITUDE, decimal(location.altitude));
        self.metadata.set(tags::RTK_LONGITUDE, decimal(location.longitude));
        self.metadata.set(tags::RTK_LATITUDE, decimal(location.latitude));
        self.metadata.set(tags::RTK_XY_ACCURACY, decimal(location.horizontal));
        self.metadata.set(tags::RTK_Z_ACCURACY, decimal(location.vertical));

        self.metadata.set(tags::RTK_YAW, "0.0");
        self.metadata.set(tags::RTK_ROLL, "0.0");
        self.metadata.set(tags::RTK_PITCH, "0.0");
        self.metadata.set(tags::RTK_MODEL, "newVidoc");

        if let Some(id) = rtk_id {
            self.metadata.set(tags::RTK_ID, id);
        }
        if let Some(serial) = rtk_serial_number {
            self.metadata.set(tags::RTK_SERIAL_NUMBER, serial);
        }

        self.is_rtk = true;
    }

    pub fn set_gps_location(&mut self, location: &LocationModel) {
        self.latitude = location.latitude;
        self.longitude = location.longitude;
        self.altitude = location.altitude;

        let altitude_ref = if location.altitude >= 0.0 { "0" } else { "1" };
        let longitude_ref = if location.longitude > 0.0 { "E" } else { "W" };
        let latitude_ref = if location.latitude > 0.0 { "N" } else { "S" };

        self.metadata
            .set(tags::GPS_ALTITUDE, fraction_string(location.altitude.abs()));
        self.metadata.set(tags::GPS_ALTITUDE_REF, altitude_ref);
        self.metadata
            .set(tags::GPS_LONGITUDE, decimal(location.longitude.abs()));
        self.metadata.set(tags::GPS_LONGITUDE_REF, longitude_ref);
        self.metadata
            .set(tags::GPS_LATITUDE, decimal(location.latitude.abs()));
        self.metadata.set(tags::GPS_LATITUDE_REF, latitude_ref);

        self.metadata
            .set(tags::GPS_XY_ACCURACY, decimal(location.horizontal));
        self.metadata.set(tags::GPS_Z_ACCURACY, decimal(location.vertical));
    }

    /// Focal length and principal point given in pixels, converted to millimetres.
    pub fn set_focal_length_pixel(
        &mut self,
        focal_length: f64,
        principal_point_x: f64,
        principal_point_y: f64,
        pixel_size: f64,
    ) {
        let f = round_to(focal_length * pixel_size, 4);
        let x = round_to(principal_point_x * pixel_size, 4);
        let y = round_to(principal_point_y * pixel_size, 4);

        self.metadata.set(tags::FOCAL_LENGTH, fraction_string(f));
        self.metadata.set(tags::PERSPECTIVE_FOCAL_LENGTH, decimal(f));
        self.metadata
            .set(tags::PRINCIPAL_POINT, format!("{},{}", decimal(x), decimal(y)));
        self.metadata.set(tags::MODEL_TYPE, "perspective");
        self.metadata
            .set(tags::PERSPECTIVE_DISTORTION, "0.000001,0.0,0.0,0.0,0.0");
        self.metadata.set(tags::FOCAL_PLANE_RESOLUTION_UNIT, "4");
        self.metadata.set(tags::FOCAL_PLANE_X_RESOLUTION, "3998077/10395");
        self.metadata.set(tags::FOCAL_PLANE_Y_RESOLUTION, "3998077/10395");
    }

    pub fn set_euler_angles(&mut self, angles: &EulerAngles) {
        self.metadata.set(tags::YAW, decimal(angles.yaw));
        self.metadata.set(tags::ROLL, decimal(angles.roll));
        self.metadata.set(tags::PITCH, decimal(angles.pitch));
    }

    /// Rewrite the photo with its accumulated tags and patch in the GPS coordinates.
    pub fn export(&mut self, lens_model: &str) -> Result<(), ExportError> {
        let now = Local::now();
        let date = now.format(PHOTO_DATE_FORMAT).to_string();
        let image_unique_id = random_digits(20);

        self.metadata.set(tags::PHOTOSHOP_DATE_CREATED, date.clone());
        self.metadata.set(tags::PHOTOSHOP_DATE_TIME_ORIGINAL, date);
        self.metadata.set(tags::LENS_MODEL, lens_model);
        self.metadata.set(tags::IMAGE_UNIQUE_ID, image_unique_id.clone());
        self.metadata
            .set(tags::ORIENTATION, PHOTO_ORIENTATION.to_string());

        let fields = ExifFields {
            make: self.make.clone(),
            model: self.model.clone(),
            orientation: PHOTO_ORIENTATION,
            date_time: now.format(EXIF_DATE_FORMAT).to_string(),
            subsec_time_original: self.subsec_time_original.clone(),
            image_unique_id,
            lens_model: lens_model.to_string(),
            latitude_ref: if self.latitude > 0.0 { 'N' } else { 'S' },
            longitude_ref: if self.longitude > 0.0 { 'E' } else { 'W' },
            altitude: self.altitude.abs(),
            altitude_ref: if self.altitude >= 0.0 { 0 } else { 1 },
        };

        let jpeg = fs::read(&self.path)?;
        let rewritten = insert_metadata_segments(
            &jpeg,
            &build_exif_payload(&fields),
            self.metadata.to_packet().as_bytes(),
        )?;
        fs::write(&self.path, &rewritten)?;

        let offsets =
            patch_gps_coordinates(&self.path, self.latitude.abs(), self.longitude.abs())?;
        debug!(
            "[Exporter] Patched GPS into {:?} (lat slot {:?}, lon slot {:?})",
            self.path, offsets.latitude, offsets.longitude
        );
        Ok(())
    }
}
