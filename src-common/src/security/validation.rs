//! Input validation for session names, frame dimensions and coordinates.

use once_cell::sync::Lazy;
use regex::Regex;

/// Session name pattern, matching the `yyyy-MM-dd-HH-mm-ss` directory names.
static SESSION_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}$").unwrap());

/// Archive names accept letters, digits, dash, underscore and dot, 1-128 chars,
/// and must not start with a dot.
static ARCHIVE_NAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_\-][A-Za-z0-9_.\-]{0,127}$").unwrap());

/// Maximum dimension value (must be positive)
pub const MAX_DIMENSION: u32 = 16384;

/// Validation error types.
#[derive(Debug, Clone)]
pub enum ValidationError {
    /// Session name does not follow the timestamp format
    InvalidSessionName(String),
    /// Archive name contains invalid characters or is too long
    InvalidArchiveName(String),
    /// Dimension (width/height) is out of valid range
    DimensionOutOfRange {
        field: &'static str,
        value: u32,
        max: u32,
    },
    /// Latitude or longitude is outside its valid range or not finite
    CoordinateOutOfRange { field: &'static str, value: f64 },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::InvalidSessionName(name) => {
                write!(f, "Invalid session name: {}", name)
            }
            ValidationError::InvalidArchiveName(name) => {
                write!(f, "Invalid archive name: {}", name)
            }
            ValidationError::DimensionOutOfRange { field, value, max } => {
                write!(f, "{} out of range: {} (max {})", field, value, max)
            }
            ValidationError::CoordinateOutOfRange { field, value } => {
                write!(f, "{} out of range: {}", field, value)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a session directory name (`yyyy-MM-dd-HH-mm-ss`).
pub fn validate_session_name(name: &str) -> Result<(), ValidationError> {
    if !SESSION_NAME_PATTERN.is_match(name) {
        return Err(ValidationError::InvalidSessionName(name.to_string()));
    }
    Ok(())
}

/// Validate an archive base name (without the `.zip` extension).
pub fn validate_archive_name(name: &str) -> Result<(), ValidationError> {
    if !ARCHIVE_NAME_PATTERN.is_match(name) {
        return Err(ValidationError::InvalidArchiveName(name.to_string()));
    }
    Ok(())
}

/// Validate dimension values (width, height).
///
/// Dimensions must be positive and not exceed MAX_DIMENSION (16384).
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), ValidationError> {
    if width == 0 || width > MAX_DIMENSION {
        return Err(ValidationError::DimensionOutOfRange {
            field: "width",
            value: width,
            max: MAX_DIMENSION,
        });
    }
    if height == 0 || height > MAX_DIMENSION {
        return Err(ValidationError::DimensionOutOfRange {
            field: "height",
            value: height,
            max: MAX_DIMENSION,
        });
    }
    Ok(())
}

/// Validate a geographic coordinate in decimal degrees.
///
/// Latitude must lie in [-90, 90], longitude in [-180, 180].
pub fn validate_geo_coordinates(latitude: f64, longitude: f64) -> Result<(), ValidationError> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(ValidationError::CoordinateOutOfRange {
            field: "latitude",
            value: latitude,
        });
    }
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::CoordinateOutOfRange {
            field: "longitude",
            value: longitude,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_names() {
        assert!(validate_session_name("2026-10-17-09-30-00").is_ok());
        assert!(validate_session_name("2026-10-17").is_err());
        assert!(validate_session_name("../2026-10-17-09-30-00").is_err());
        assert!(validate_session_name("").is_err());
    }

    #[test]
    fn test_archive_names() {
        assert!(validate_archive_name("2026-10-17-09-30-00").is_ok());
        assert!(validate_archive_name("site_A.survey-2").is_ok());

        assert!(validate_archive_name("").is_err());
        assert!(validate_archive_name(".hidden").is_err());
        assert!(validate_archive_name("a/b").is_err());
        assert!(validate_archive_name(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_dimensions() {
        assert!(validate_dimensions(1920, 1440).is_ok());
        assert!(validate_dimensions(1, 1).is_ok());
        assert!(validate_dimensions(MAX_DIMENSION, MAX_DIMENSION).is_ok());

        assert!(validate_dimensions(0, 1440).is_err());
        assert!(validate_dimensions(1920, 0).is_err());
        assert!(validate_dimensions(MAX_DIMENSION + 1, 1440).is_err());
    }

    #[test]
    fn test_geo_coordinates() {
        assert!(validate_geo_coordinates(37.422, -122.084).is_ok());
        assert!(validate_geo_coordinates(-90.0, 180.0).is_ok());

        assert!(validate_geo_coordinates(90.5, 0.0).is_err());
        assert!(validate_geo_coordinates(0.0, -180.5).is_err());
        assert!(validate_geo_coordinates(f64::NAN, 0.0).is_err());
    }
}
