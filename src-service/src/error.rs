//! Error types for export, metadata patching and session operations.

use std::fmt;
use std::path::PathBuf;

/// Error type for the in-place EXIF GPS patcher.
#[derive(Debug)]
pub enum PatchError {
    /// Reading or writing the target file failed
    Io(std::io::Error),
    /// A required marker or tag was not found in the container
    MarkerNotFound(&'static str),
    /// A read or write fell outside the file
    OutOfBounds { offset: usize, len: usize },
    /// The TIFF header inside the EXIF block is malformed
    InvalidHeader(String),
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatchError::Io(e) => write!(f, "I/O error: {}", e),
            PatchError::MarkerNotFound(marker) => write!(f, "Marker not found: {}", marker),
            PatchError::OutOfBounds { offset, len } => {
                write!(f, "Access out of bounds: offset {} (file length {})", offset, len)
            }
            PatchError::InvalidHeader(msg) => write!(f, "Invalid EXIF header: {}", msg),
        }
    }
}

impl std::error::Error for PatchError {}

impl From<std::io::Error> for PatchError {
    fn from(err: std::io::Error) -> Self {
        PatchError::Io(err)
    }
}

impl From<PatchError> for String {
    fn from(err: PatchError) -> Self {
        err.to_string()
    }
}

/// Error type for per-frame artifact export.
#[derive(Debug)]
pub enum ExportError {
    /// The frame carries a depth map but no confidence map
    MissingConfidence,
    /// Image or TIFF encoding failed
    Encode(String),
    /// Writing an artifact failed
    Io(std::io::Error),
    /// A pixel buffer does not match its declared dimensions
    InvalidBuffer(String),
    /// GPS patching of the written photo failed
    Patch(PatchError),
    /// The blocking export task panicked or was cancelled
    Task(String),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::MissingConfidence => write!(f, "Confidence map missing"),
            ExportError::Encode(msg) => write!(f, "Encoding failed: {}", msg),
            ExportError::Io(e) => write!(f, "I/O error: {}", e),
            ExportError::InvalidBuffer(msg) => write!(f, "Invalid buffer: {}", msg),
            ExportError::Patch(e) => write!(f, "GPS patch failed: {}", e),
            ExportError::Task(msg) => write!(f, "Export task failed: {}", msg),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<std::io::Error> for ExportError {
    fn from(err: std::io::Error) -> Self {
        ExportError::Io(err)
    }
}

impl From<PatchError> for ExportError {
    fn from(err: PatchError) -> Self {
        ExportError::Patch(err)
    }
}

impl From<image::ImageError> for ExportError {
    fn from(err: image::ImageError) -> Self {
        ExportError::Encode(err.to_string())
    }
}

impl From<tiff::TiffError> for ExportError {
    fn from(err: tiff::TiffError) -> Self {
        ExportError::Encode(err.to_string())
    }
}

impl From<tokio::task::JoinError> for ExportError {
    fn from(err: tokio::task::JoinError) -> Self {
        ExportError::Task(err.to_string())
    }
}

impl From<ExportError> for String {
    fn from(err: ExportError) -> Self {
        err.to_string()
    }
}

/// Error type for capture session lifecycle and archiving.
#[derive(Debug)]
pub enum SessionError {
    /// The session directory does not exist (already archived or cleared)
    DirectoryMissing(PathBuf),
    /// An archive with this name already exists in the storage root
    DuplicateArchive(String),
    /// A session directory with this name already exists
    SessionExists(String),
    /// No session is active
    NotActive,
    /// The storage root or a session name failed validation
    InvalidPath(String),
    /// Filesystem error
    Io(std::io::Error),
    /// Zip writer error
    Archive(String),
    /// Sidecar serialization error
    Serialize(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::DirectoryMissing(path) => {
                write!(f, "Session directory missing: {}", path.display())
            }
            SessionError::DuplicateArchive(name) => write!(f, "Archive already exists: {}", name),
            SessionError::SessionExists(name) => write!(f, "Session already exists: {}", name),
            SessionError::NotActive => write!(f, "No active session"),
            SessionError::InvalidPath(msg) => write!(f, "Invalid path: {}", msg),
            SessionError::Io(e) => write!(f, "I/O error: {}", e),
            SessionError::Archive(msg) => write!(f, "Archive error: {}", msg),
            SessionError::Serialize(msg) => write!(f, "Serialization error: {}", msg),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(err: std::io::Error) -> Self {
        SessionError::Io(err)
    }
}

impl From<zip::result::ZipError> for SessionError {
    fn from(err: zip::result::ZipError) -> Self {
        SessionError::Archive(err.to_string())
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        SessionError::Serialize(err.to_string())
    }
}

impl From<SessionError> for String {
    fn from(err: SessionError) -> Self {
        err.to_string()
    }
}

/// Error type for frame sources.
#[derive(Debug)]
pub enum SourceError {
    /// Reading the recording failed
    Io(std::io::Error),
    /// A recorded line could not be parsed
    Parse { line: usize, message: String },
    /// A referenced image could not be decoded
    Image(String),
}

impl fmt::Display for SourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceError::Io(e) => write!(f, "I/O error: {}", e),
            SourceError::Parse { line, message } => {
                write!(f, "Invalid frame record on line {}: {}", line, message)
            }
            SourceError::Image(msg) => write!(f, "Image decode failed: {}", msg),
        }
    }
}

impl std::error::Error for SourceError {}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Io(err)
    }
}

impl From<SourceError> for String {
    fn from(err: SourceError) -> Self {
        err.to_string()
    }
}
