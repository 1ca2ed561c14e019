//! On-disk dataset for one capture run.
//!
//! A session owns a timestamp-named directory under the storage root. The
//! export worker appends one [`SessionRecord`] per exported photo; finalizing
//! writes the pose log and manifest, and archiving zips the directory with
//! its top-level folder flattened and removes it.

use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use photocap_common::security::path_validation::{is_duplicate_archive_name, validate_storage_root};
use photocap_common::security::validation::{validate_archive_name, validate_session_name};
use photocap_common::{ImageResolution, LocationModel, ManifestModel};
use serde::Serialize;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::capture::{random_uuid, ArtifactNames, FrameMetadata};
use crate::error::SessionError;

/// Directory name format, e.g. `2026-10-17-09-30-00`.
pub const SESSION_NAME_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";
pub const MANIFEST_FILE_NAME: &str = "manifest.json";
pub const POSE_LOG_FILE_NAME: &str = "poses.json";
pub const GPS_FOLDER_NAME: &str = "_gps";
pub const GPS_TRACK_FILE_NAME: &str = "track.json";

/// Overlap threshold of a newly created session.
pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.8;

/// Minimum ratio increase between two progress reports.
pub const PROGRESS_STEP: f64 = 0.001;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// One located keyframe in the GPS track.
#[derive(Debug, Clone, Serialize)]
struct GpsFix {
    index: u32,
    timestamp: f64,
    location: LocationModel,
}

/// A photo written into the session directory.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedImage {
    pub name: String,
    pub path: PathBuf,
    pub is_rtk: bool,
}

/// One exported keyframe: its metadata snapshot and photo.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub metadata: FrameMetadata,
    pub image: ExportedImage,
}

/// A capture run and its dataset directory.
#[derive(Debug)]
pub struct CaptureSession {
    id: String,
    name: String,
    root: PathBuf,
    path: PathBuf,
    is_rtk: bool,
    overlap_threshold: f64,
    image_resolution: ImageResolution,
    records: Mutex<Vec<SessionRecord>>,
}

impl CaptureSession {
    /// Create a session named after the current local time.
    pub fn create(root: &Path, is_rtk: bool) -> Result<Self, SessionError> {
        let name = Local::now().format(SESSION_NAME_FORMAT).to_string();
        Self::create_named(root, &name, is_rtk)
    }

    /// Create a session with an explicit directory name.
    pub fn create_named(root: &Path, name: &str, is_rtk: bool) -> Result<Self, SessionError> {
        validate_session_name(name).map_err(|e| SessionError::InvalidPath(e.to_string()))?;
        let root = validate_storage_root(root).map_err(|e| SessionError::InvalidPath(e.to_string()))?;

        let path = root.join(name);
        if path.exists() {
            return Err(SessionError::SessionExists(name.to_string()));
        }
        fs::create_dir_all(&path)?;
        info!("[Session] Created {:?}", path);

        Ok(Self {
            id: random_uuid(),
            name: name.to_string(),
            root,
            path,
            is_rtk,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            image_resolution: ImageResolution::Maximum,
            records: Mutex::new(Vec::new()),
        })
    }

    /// Reopen an existing session directory, e.g. one left behind by a crash.
    ///
    /// Records are not recovered; the manifest of a reopened session lists
    /// only what is added after opening.
    pub fn open(path: &Path) -> Result<Self, SessionError> {
        if !path.is_dir() {
            return Err(SessionError::DirectoryMissing(path.to_path_buf()));
        }
        let path = fs::canonicalize(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| SessionError::InvalidPath(path.display().to_string()))?;
        let root = path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| SessionError::InvalidPath(path.display().to_string()))?;

        Ok(Self {
            id: random_uuid(),
            name,
            root,
            path,
            is_rtk: false,
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            image_resolution: ImageResolution::Maximum,
            records: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_rtk(&self) -> bool {
        self.is_rtk
    }

    pub fn overlap_threshold(&self) -> f64 {
        self.overlap_threshold
    }

    pub fn set_overlap_threshold(&mut self, threshold: f64) {
        self.overlap_threshold = threshold;
    }

    pub fn image_resolution(&self) -> ImageResolution {
        self.image_resolution
    }

    pub fn set_image_resolution(&mut self, resolution: ImageResolution) {
        self.image_resolution = resolution;
    }

    /// Append an exported keyframe.
    pub fn add_record(&self, metadata: FrameMetadata, image: ExportedImage) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        records.push(SessionRecord { metadata, image });
    }

    /// Snapshot of the exported keyframes in export order.
    pub fn records(&self) -> Vec<SessionRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn frame_count(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Manifest listing every exported keyframe's artifacts.
    pub fn manifest(&self, log_files: &[String]) -> ManifestModel {
        let mut manifest = ManifestModel::new();
        for file in log_files {
            manifest.append_log_file(file.clone());
        }
        for record in self.records.lock().unwrap_or_else(|e| e.into_inner()).iter() {
            manifest.append_image(record.metadata.output_model());
        }
        manifest
    }

    /// `<root>/<name>.zip`, rejecting names that are unsafe as file names.
    fn archive_destination(&self, name: &str) -> Result<PathBuf, SessionError> {
        validate_archive_name(name).map_err(|e| SessionError::InvalidPath(e.to_string()))?;
        Ok(self.root.join(format!("{}.zip", name)))
    }

    fn ensure_directory(&self) -> Result<(), SessionError> {
        if !self.path.is_dir() {
            return Err(SessionError::DirectoryMissing(self.path.clone()));
        }
        Ok(())
    }

    /// Write `poses.json`, the ordered list of keyframe snapshots.
    pub fn write_pose_log(&self) -> Result<PathBuf, SessionError> {
        self.ensure_directory()?;
        let poses: Vec<FrameMetadata> = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| r.metadata.clone())
            .collect();

        let path = self.path.join(POSE_LOG_FILE_NAME);
        let json = serde_json::to_string_pretty(&poses)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// Write `manifest.json`.
    pub fn write_manifest(&self, log_files: &[String]) -> Result<ManifestModel, SessionError> {
        self.ensure_directory()?;
        let manifest = self.manifest(log_files);
        let json = serde_json::to_string_pretty(&manifest)?;
        fs::write(self.path.join(MANIFEST_FILE_NAME), json)?;
        Ok(manifest)
    }

    /// Write `_gps/track.json` with the location of every located keyframe.
    ///
    /// Nothing is written, and the folder is not created, when no keyframe
    /// carries a location.
    pub fn write_gps_track(&self) -> Result<Option<PathBuf>, SessionError> {
        self.ensure_directory()?;
        let unknown = LocationModel::default();
        let fixes: Vec<GpsFix> = self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|r| GpsFix {
                index: r.metadata.index,
                timestamp: r.metadata.timestamp,
                location: r.metadata.location(),
            })
            .filter(|fix| fix.location != unknown)
            .collect();
        if fixes.is_empty() {
            return Ok(None);
        }

        let path = self.gps_folder()?.join(GPS_TRACK_FILE_NAME);
        fs::write(&path, serde_json::to_string_pretty(&fixes)?)?;
        debug!("[Session] Wrote {} GPS fixes to {:?}", fixes.len(), path);
        Ok(Some(path))
    }

    /// Write the pose log, the GPS track and the manifest.
    pub fn finalize(&self) -> Result<ManifestModel, SessionError> {
        self.write_pose_log()?;
        self.write_gps_track()?;
        let manifest = self.write_manifest(&[POSE_LOG_FILE_NAME.to_string()])?;
        info!(
            "[Session] Finalized {} with {} keyframes",
            self.name,
            manifest.inputs.len()
        );
        Ok(manifest)
    }

    /// The `_gps` folder, created on first use.
    pub fn gps_folder(&self) -> Result<PathBuf, SessionError> {
        let folder = self.path.join(GPS_FOLDER_NAME);
        if !folder.exists() {
            fs::create_dir_all(&folder)?;
        }
        Ok(folder)
    }

    /// Delete the session directory if it still exists.
    pub fn clear(&self) {
        if self.path.exists() {
            match fs::remove_dir_all(&self.path) {
                Ok(()) => info!("[Session] Cleared {:?}", self.path),
                Err(e) => warn!("[Session] Failed to clear {:?}: {}", self.path, e),
            }
        }
    }

    /// Zip the session into `<name>-save.zip` without progress reporting.
    ///
    /// Fails with `DuplicateArchive` when that archive already exists and
    /// `overwrite` is false. The directory is removed unless `keep_directory`.
    pub fn archive(&self, overwrite: bool, keep_directory: bool) -> Result<PathBuf, SessionError> {
        self.ensure_directory()?;
        let archive_name = format!("{}-save", self.name);
        let destination = self.archive_destination(&archive_name)?;
        if is_duplicate_archive_name(&self.root, &archive_name) && !overwrite {
            return Err(SessionError::DuplicateArchive(archive_name));
        }

        zip_directory(&self.path, &destination, |_| {})?;
        if !keep_directory {
            fs::remove_dir_all(&self.path)?;
        }
        info!("[Session] Archived to {:?}", destination);
        Ok(destination)
    }

    /// Zip the session into `<name>.zip`, reporting progress, then remove the directory.
    ///
    /// An existing archive of the same name is replaced. `on_progress` sees
    /// increasing ratios in [0, 1] and always ends with exactly 1.0.
    pub fn archive_with_progress<F>(&self, on_progress: F) -> Result<PathBuf, SessionError>
    where
        F: FnMut(f64),
    {
        self.ensure_directory()?;
        let destination = self.archive_destination(&self.name)?;
        if destination.exists() {
            fs::remove_file(&destination)?;
        }

        zip_directory(&self.path, &destination, on_progress)?;
        fs::remove_dir_all(&self.path)?;
        info!("[Session] Archived to {:?}", destination);
        Ok(destination)
    }
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), SessionError> {
    let mut entries = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            collect_files(&path, files)?;
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn relative_name(base: &Path, path: &Path) -> Result<String, SessionError> {
    let relative = path
        .strip_prefix(base)
        .map_err(|e| SessionError::Archive(e.to_string()))?;
    Ok(relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

/// Zip every file under `source` into `destination`, paths relative to `source`.
///
/// Progress is reported by bytes read, emitted when the ratio has grown by at
/// least [`PROGRESS_STEP`], and closed with a final 1.0.
pub fn zip_directory<F>(source: &Path, destination: &Path, mut on_progress: F) -> Result<(), SessionError>
where
    F: FnMut(f64),
{
    if !source.is_dir() {
        return Err(SessionError::DirectoryMissing(source.to_path_buf()));
    }

    let mut files = Vec::new();
    collect_files(source, &mut files)?;
    let total: u64 = files
        .iter()
        .map(|f| fs::metadata(f).map(|m| m.len()).unwrap_or(0))
        .sum();

    let mut writer = ZipWriter::new(BufWriter::new(File::create(destination)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut processed: u64 = 0;
    let mut last_reported = 0.0;
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];

    for path in &files {
        let name = relative_name(source, path)?;
        writer.start_file(name.as_str(), options)?;

        let mut input = File::open(path)?;
        loop {
            let read = input.read(&mut buffer)?;
            if read == 0 {
                break;
            }
            writer.write_all(&buffer[..read])?;
            processed += read as u64;

            if total > 0 {
                let ratio = (processed as f64 / total as f64).min(1.0);
                if ratio - last_reported >= PROGRESS_STEP && ratio < 1.0 {
                    last_reported = ratio;
                    on_progress(ratio);
                }
            }
        }
        debug!("[Session] Added {} to archive", name);
    }

    let mut inner = writer.finish()?;
    inner.flush()?;
    on_progress(1.0);
    Ok(())
}
