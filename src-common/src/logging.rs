//! Platform-specific logging directory resolution.

use std::path::PathBuf;

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/photocap/logs` or `~/.local/state/photocap/logs` |
/// | macOS | `~/Library/Logs/photocap` |
/// | Windows | `%LOCALAPPDATA%\photocap\photocap\logs` |
///
/// Falls back to `<temp>/photocap/logs` when no home directory can be found.
pub fn log_dir() -> PathBuf {
    let Some(base) = directories::ProjectDirs::from("", "", "photocap") else {
        return std::env::temp_dir().join("photocap").join("logs");
    };

    #[cfg(target_os = "linux")]
    {
        base.state_dir()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().join("state"))
            .join("logs")
    }

    #[cfg(target_os = "macos")]
    {
        // data_local_dir is ~/Library/Application Support/photocap; walk up to ~/Library
        let library = base
            .data_local_dir()
            .parent()
            .and_then(|p| p.parent())
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| base.data_local_dir().to_path_buf());
        library.join("Logs").join("photocap")
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        base.data_local_dir().join("logs")
    }
}

/// Ensures the log directory exists, creating it if necessary.
pub fn ensure_log_dir() -> Result<PathBuf, std::io::Error> {
    let dir = log_dir();
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// File name prefix used by the rolling appender.
///
/// The appender creates dated files such as `photocap.2026-03-01.log`.
pub const LOG_FILE_PREFIX: &str = "photocap.log";

/// Returns the base path for the application log file.
pub fn app_log_path() -> PathBuf {
    log_dir().join(LOG_FILE_PREFIX)
}

/// Returns the default storage root for capture sessions.
///
/// Sessions are created as timestamped subdirectories of this folder and
/// archives are written next to them.
pub fn default_storage_root() -> PathBuf {
    match directories::ProjectDirs::from("", "", "photocap") {
        Some(base) => base.data_dir().join("Camera"),
        None => std::env::temp_dir().join("photocap").join("Camera"),
    }
}
