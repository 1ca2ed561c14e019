//! Exit codes for the CLI.
//!
//! These codes enable scripting integration by providing structured
//! feedback about operation results.

use photocap_service::{ExportError, PatchError, SessionError, SourceError};

/// Exit codes for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    /// Operation completed successfully
    Success = 0,
    /// General/unspecified error
    GeneralError = 1,
    /// Invalid command-line arguments or input file
    InvalidArguments = 2,
    /// Session could not be created, finalized or archived
    SessionFailed = 3,
    /// One or more keyframes failed to export
    ExportFailed = 4,
    /// GPS slots could not be located or patched
    PatchFailed = 5,
}

impl ExitCode {
    /// Convert to i32 for process exit.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl std::fmt::Display for ExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitCode::Success => write!(f, "success"),
            ExitCode::GeneralError => write!(f, "general error"),
            ExitCode::InvalidArguments => write!(f, "invalid arguments"),
            ExitCode::SessionFailed => write!(f, "session failed"),
            ExitCode::ExportFailed => write!(f, "export failed"),
            ExitCode::PatchFailed => write!(f, "patch failed"),
        }
    }
}

impl From<&SessionError> for ExitCode {
    fn from(err: &SessionError) -> Self {
        match err {
            SessionError::InvalidPath(_) => ExitCode::InvalidArguments,
            _ => ExitCode::SessionFailed,
        }
    }
}

impl From<&ExportError> for ExitCode {
    fn from(_: &ExportError) -> Self {
        ExitCode::ExportFailed
    }
}

impl From<&PatchError> for ExitCode {
    fn from(err: &PatchError) -> Self {
        match err {
            PatchError::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
                ExitCode::InvalidArguments
            }
            _ => ExitCode::PatchFailed,
        }
    }
}

impl From<&SourceError> for ExitCode {
    fn from(err: &SourceError) -> Self {
        match err {
            SourceError::Io(_) => ExitCode::GeneralError,
            SourceError::Parse { .. } | SourceError::Image(_) => ExitCode::InvalidArguments,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::InvalidArguments.as_i32(), 2);
        assert_eq!(ExitCode::SessionFailed.as_i32(), 3);
        assert_eq!(ExitCode::ExportFailed.as_i32(), 4);
        assert_eq!(ExitCode::PatchFailed.as_i32(), 5);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(ExitCode::from(&SessionError::NotActive), ExitCode::SessionFailed);
        assert_eq!(
            ExitCode::from(&PatchError::MarkerNotFound("Exif")),
            ExitCode::PatchFailed
        );
        let missing = PatchError::Io(std::io::Error::from(std::io::ErrorKind::NotFound));
        assert_eq!(ExitCode::from(&missing), ExitCode::InvalidArguments);
        assert_eq!(
            ExitCode::from(&ExportError::MissingConfidence),
            ExitCode::ExportFailed
        );
    }
}
