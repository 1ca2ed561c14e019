//! Pipeline configuration.
//!
//! Loaded from a JSON file in the platform config directory:
//! - Linux: `~/.config/photocap/config.json`
//! - macOS: `~/Library/Application Support/photocap/config.json`
//! - Windows: `%APPDATA%\photocap\config.json`
//!
//! Every group carries `#[serde(default)]` so older or partial files keep loading.

use directories::ProjectDirs;
use photocap_common::ImageResolution;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::capture::DisplayOrientation;

/// Where sessions and archives are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage root override. `None` uses the platform data directory.
    #[serde(default)]
    pub root: Option<PathBuf>,
}

impl StorageConfig {
    /// Resolve the storage root, falling back to the platform default.
    pub fn resolve_root(&self) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(photocap_common::logging::default_storage_root)
    }
}

/// Keyframe admission settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Overlap threshold before a session is started
    #[serde(default = "default_initial_overlap_threshold")]
    pub initial_overlap_threshold: f64,
    /// Overlap threshold applied once a session is active
    #[serde(default = "default_operating_overlap_threshold")]
    pub operating_overlap_threshold: f64,
    /// At or below this many feature points the field-of-view estimator is used
    #[serde(default = "default_feature_point_density_threshold")]
    pub feature_point_density_threshold: usize,
    #[serde(default)]
    pub export_resolution: ImageResolution,
    /// Whether the session is captured with an RTK receiver
    #[serde(default)]
    pub rtk: bool,
}

fn default_initial_overlap_threshold() -> f64 {
    0.8
}

fn default_operating_overlap_threshold() -> f64 {
    0.9
}

fn default_feature_point_density_threshold() -> usize {
    250
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            initial_overlap_threshold: default_initial_overlap_threshold(),
            operating_overlap_threshold: default_operating_overlap_threshold(),
            feature_point_density_threshold: default_feature_point_density_threshold(),
            export_resolution: ImageResolution::Maximum,
            rtk: false,
        }
    }
}

/// Artifact encoding and tagging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// JPEG quality, 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    #[serde(default = "default_device_make")]
    pub device_make: String,
    #[serde(default = "default_device_model")]
    pub device_model: String,
    #[serde(default = "default_lens_model")]
    pub lens_model: String,
    /// Sensor pixel pitch in millimetres, used to convert focal length from pixels
    #[serde(default = "default_pixel_size_mm")]
    pub pixel_size_mm: f64,
    #[serde(default)]
    pub display_orientation: DisplayOrientation,
    /// RTK receiver identifier written to the RTK tag block
    #[serde(default)]
    pub rtk_id: Option<String>,
    /// RTK receiver serial number written to the RTK tag block
    #[serde(default)]
    pub rtk_serial: Option<String>,
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_device_make() -> String {
    "Apple".to_string()
}

fn default_device_model() -> String {
    "photocap.iPhone".to_string()
}

fn default_lens_model() -> String {
    "iOS".to_string()
}

fn default_pixel_size_mm() -> f64 {
    0.0026
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            device_make: default_device_make(),
            device_model: default_device_model(),
            lens_model: default_lens_model(),
            pixel_size_mm: default_pixel_size_mm(),
            display_orientation: DisplayOrientation::Portrait,
            rtk_id: None,
            rtk_serial: None,
        }
    }
}

/// Finalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Zip the session directory when it is finalized
    #[serde(default = "default_archive_enabled")]
    pub enabled: bool,
    /// Keep the session directory after a plain (non-progress) archive
    #[serde(default)]
    pub keep_directory: bool,
}

fn default_archive_enabled() -> bool {
    true
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            enabled: default_archive_enabled(),
            keep_directory: false,
        }
    }
}

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Get the path to the default config file.
pub fn config_path() -> Result<PathBuf, String> {
    let proj_dirs = ProjectDirs::from("", "", "photocap")
        .ok_or("Could not determine config directory")?;
    Ok(proj_dirs.config_dir().join("config.json"))
}

/// Load configuration from the default location.
/// Returns default config if the file doesn't exist or is invalid.
pub fn load_config() -> PipelineConfig {
    match config_path() {
        Ok(path) => load_config_from(&path),
        Err(e) => {
            tracing::warn!("Failed to get config path: {}", e);
            PipelineConfig::default()
        }
    }
}

/// Load configuration from an explicit path.
pub fn load_config_from(path: &Path) -> PipelineConfig {
    if !path.exists() {
        tracing::debug!("No config file at {:?}, using defaults", path);
        return PipelineConfig::default();
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<PipelineConfig>(&contents) {
            Ok(config) => {
                tracing::debug!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse config file: {}. Using defaults.", e);
                PipelineConfig::default()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read config file: {}. Using defaults.", e);
            PipelineConfig::default()
        }
    }
}

/// Save configuration to the default location.
pub fn save_config(config: &PipelineConfig) -> Result<(), String> {
    save_config_to(config, &config_path()?)
}

/// Save configuration to an explicit path, creating its directory.
pub fn save_config_to(config: &PipelineConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }

    let json = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {}", e))?;

    fs::write(path, json).map_err(|e| format!("Failed to write config file: {}", e))?;

    tracing::debug!("Saved config to {:?}", path);
    Ok(())
}
