//! XMP packet construction.
//!
//! Properties are addressed by `prefix:Name` paths. Setting a path twice
//! replaces the earlier value and keeps its position, so the packet lists
//! properties in first-set order.

/// Custom camera namespace understood by photogrammetry tooling.
pub const CAMERA_NAMESPACE: &str = "http://pix4d.com/camera/1.0/";
pub const CAMERA_PREFIX: &str = "Camera";

/// Namespaces declared on every packet, as (prefix, uri).
pub const NAMESPACES: [(&str, &str); 5] = [
    (CAMERA_PREFIX, CAMERA_NAMESPACE),
    ("photoshop", "http://ns.adobe.com/photoshop/1.0/"),
    ("exif", "http://ns.adobe.com/exif/1.0/"),
    ("exifEX", "http://cipa.jp/exif/1.0/"),
    ("tiff", "http://ns.adobe.com/tiff/1.0/"),
];

/// Property paths written by the exporters.
pub mod tags {
    pub const BRAND_NAME: &str = "Camera:BrandName";
    pub const CAPTURE_UUID: &str = "Camera:CaptureUUID";
    pub const DEPTH_UNIT: &str = "Camera:DepthUnit";
    pub const DEPTH_CONFIDENCE_RANGE_MIN: &str = "Camera:DepthConfidenceRangeMin";
    pub const DEPTH_CONFIDENCE_RANGE_MAX: &str = "Camera:DepthConfidenceRangeMax";
    pub const DEPTH_CONFIDENCE_UNIT: &str = "Camera:DepthConfidenceUnit";

    pub const MODEL_TYPE: &str = "Camera:ModelType";
    pub const PERSPECTIVE_DISTORTION: &str = "Camera:PerspectiveDistortion";
    pub const PRINCIPAL_POINT: &str = "Camera:PrincipalPoint";
    pub const PERSPECTIVE_FOCAL_LENGTH: &str = "Camera:PerspectiveFocalLength";
    pub const FOCAL_LENGTH: &str = "exif:FocalLength";
    pub const FOCAL_PLANE_X_RESOLUTION: &str = "exif:FocalPlaneXResolution";
    pub const FOCAL_PLANE_Y_RESOLUTION: &str = "exif:FocalPlaneYResolution";
    pub const FOCAL_PLANE_RESOLUTION_UNIT: &str = "exif:FocalPlaneResolutionUnit";

    pub const HORIZ_CS: &str = "Camera:HorizCS";
    pub const VERT_CS: &str = "Camera:VertCS";

    pub const YAW: &str = "Camera:Yaw";
    pub const ROLL: &str = "Camera:Roll";
    pub const PITCH: &str = "Camera:Pitch";

    pub const RTK_YAW: &str = "Camera:RTKYaw";
    pub const RTK_ROLL: &str = "Camera:RTKRoll";
    pub const RTK_PITCH: &str = "Camera:RTKPitch";
    pub const RTK_ALTITUDE: &str = "Camera:RTKAltitude";
    pub const RTK_LONGITUDE: &str = "Camera:RTKLongitude";
    pub const RTK_LATITUDE: &str = "Camera:RTKLatitude";
    pub const RTK_XY_ACCURACY: &str = "Camera:RTKXYAccuracy";
    pub const RTK_Z_ACCURACY: &str = "Camera:RTKZAccuracy";
    pub const RTK_MODEL: &str = "Camera:RTKModel";
    pub const RTK_ID: &str = "Camera:RTKId";
    pub const RTK_SERIAL_NUMBER: &str = "Camera:RTKSerialNumber";

    pub const GPS_ALTITUDE: &str = "exif:GPSAltitude";
    pub const GPS_ALTITUDE_REF: &str = "exif:GPSAltitudeRef";
    pub const GPS_LONGITUDE: &str = "exif:GPSLongitude";
    pub const GPS_LONGITUDE_REF: &str = "exif:GPSLongitudeRef";
    pub const GPS_LATITUDE: &str = "exif:GPSLatitude";
    pub const GPS_LATITUDE_REF: &str = "exif:GPSLatitudeRef";
    pub const GPS_XY_ACCURACY: &str = "Camera:GPSXYAccuracy";
    pub const GPS_Z_ACCURACY: &str = "Camera:GPSZAccuracy";

    pub const PHOTOSHOP_DATE_CREATED: &str = "photoshop:DateCreated";
    pub const PHOTOSHOP_DATE_TIME_ORIGINAL: &str = "photoshop:DateTimeOriginal";
    pub const DATE_TIME_ORIGINAL: &str = "exif:DateTimeOriginal";
    pub const SUBSEC_TIME_ORIGINAL: &str = "exif:SubsecTimeOriginal";
    pub const IMAGE_UNIQUE_ID: &str = "exif:ImageUniqueID";
    pub const LENS_MODEL: &str = "exifEX:LensModel";

    pub const ORIENTATION: &str = "tiff:Orientation";
    pub const PHOTOMETRIC_INTERPRETATION: &str = "tiff:PhotometricInterpretation";
    pub const COMPRESSION: &str = "tiff:Compression";
    pub const RESOLUTION_UNIT: &str = "tiff:ResolutionUnit";
    pub const MAKE: &str = "tiff:Make";
    pub const MODEL: &str = "tiff:Model";
}

/// Format a float the way tag consumers expect: shortest form, always with a fraction.
pub fn decimal(value: f64) -> String {
    format!("{:?}", value)
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// An ordered set of XMP properties.
#[derive(Debug, Clone, Default)]
pub struct XmpMetadata {
    properties: Vec<(String, String)>,
}

impl XmpMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` (e.g. `Camera:BrandName`) to `value`, replacing any earlier value.
    pub fn set(&mut self, path: &str, value: impl Into<String>) {
        let value = value.into();
        match self.properties.iter_mut().find(|(p, _)| p == path) {
            Some(existing) => existing.1 = value,
            None => self.properties.push((path.to_string(), value)),
        }
    }

    pub fn get(&self, path: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(p, _)| p == path)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.properties.len()
    }

    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }

    /// Serialize to a complete `<?xpacket?>`-wrapped XMP packet.
    pub fn to_packet(&self) -> String {
        let mut xml = String::new();
        xml.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
        xml.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
        xml.push_str(" <rdf:RDF xmlns:rdf=\"http://www.w3.org/1999/02/22-rdf-syntax-ns#\">\n");
        xml.push_str("  <rdf:Description rdf:about=\"\"");
        for (prefix, uri) in NAMESPACES {
            xml.push_str(&format!("\n    xmlns:{}=\"{}\"", prefix, uri));
        }
        xml.push_str(">\n");
        for (path, value) in &self.properties {
            xml.push_str(&format!("   <{0}>{1}</{0}>\n", path, escape(value)));
        }
        xml.push_str("  </rdf:Description>\n");
        xml.push_str(" </rdf:RDF>\n");
        xml.push_str("</x:xmpmeta>\n");
        xml.push_str("<?xpacket end=\"w\"?>");
        xml
    }
}
