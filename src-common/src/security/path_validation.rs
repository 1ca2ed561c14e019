//! Storage root and archive destination checks.

use std::path::{Component, Path, PathBuf};

/// Longest storage root accepted, in bytes of its lossy UTF-8 form.
pub const MAX_PATH_LENGTH: usize = 4096;

/// Why a storage root was refused.
#[derive(Debug, Clone)]
pub enum PathError {
    /// A `..` component appears anywhere in the path
    ParentComponent,
    /// The path holds a NUL byte
    NulByte,
    /// Relative roots are ambiguous across working directories
    Relative,
    /// Longer than [`MAX_PATH_LENGTH`]
    TooLong(usize),
    /// Something other than a directory already lives at the path
    NotADirectory,
    /// Creating or resolving the directory failed
    Unusable(String),
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::ParentComponent => write!(f, "Storage root must not contain '..'"),
            PathError::NulByte => write!(f, "Storage root contains a NUL byte"),
            PathError::Relative => write!(f, "Storage root must be an absolute path"),
            PathError::TooLong(len) => {
                write!(f, "Storage root is {} bytes long (limit {})", len, MAX_PATH_LENGTH)
            }
            PathError::NotADirectory => write!(f, "Storage root exists and is not a directory"),
            PathError::Unusable(e) => write!(f, "Storage root is unusable: {}", e),
        }
    }
}

impl std::error::Error for PathError {}

/// Checks that need only the path itself, not the filesystem.
fn check_shape(path: &Path) -> Result<(), PathError> {
    let text = path.to_string_lossy();
    if text.contains('\0') {
        return Err(PathError::NulByte);
    }
    if text.len() > MAX_PATH_LENGTH {
        return Err(PathError::TooLong(text.len()));
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathError::ParentComponent);
    }
    if !path.is_absolute() {
        return Err(PathError::Relative);
    }
    Ok(())
}

/// Check a storage root, create it when missing and return its canonical form.
pub fn validate_storage_root(path: &Path) -> Result<PathBuf, PathError> {
    check_shape(path)?;
    if path.exists() && !path.is_dir() {
        return Err(PathError::NotADirectory);
    }

    std::fs::create_dir_all(path)
        .and_then(|_| std::fs::canonicalize(path))
        .map_err(|e| PathError::Unusable(e.to_string()))
}

/// Whether `<name>.zip` already exists in `root`, ignoring ASCII case.
pub fn is_duplicate_archive_name(root: &Path, name: &str) -> bool {
    let wanted = format!("{}.zip", name);
    let Ok(entries) = std::fs::read_dir(root) else {
        return false;
    };
    entries
        .flatten()
        .any(|entry| entry.file_name().to_string_lossy().eq_ignore_ascii_case(&wanted))
}
