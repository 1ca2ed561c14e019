//! CLI command implementations.

use std::path::{Path, PathBuf};

use photocap_common::security::path_validation::validate_storage_root;
use photocap_common::security::validation::validate_geo_coordinates;
use photocap_common::{ImageResolution, LocationModel};
use photocap_service::capture::{DisplayOrientation, FrameSource, RecordedFrames};
use photocap_service::config::{self, PipelineConfig};
use photocap_service::exif::{patch_gps_coordinates, read_gps_coordinates, Dms};
use photocap_service::{CaptureSession, FrameDecision, KeyframePipeline, ProgressCallback};
use serde::Serialize;
use tracing::{info, warn};

use crate::colors;
use crate::exit_codes::ExitCode;

/// Output switches shared by every command.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
    pub quiet: bool,
}

impl Output {
    fn error(&self, msg: &str) {
        if !self.quiet {
            eprintln!("{}", colors::error(msg));
        }
    }

    fn print_json<T: Serialize>(&self, value: &T) -> ExitCode {
        match serde_json::to_string_pretty(value) {
            Ok(text) => {
                println!("{}", text);
                ExitCode::Success
            }
            Err(e) => {
                self.error(&format!("Failed to serialize output: {}", e));
                ExitCode::GeneralError
            }
        }
    }
}

/// Load the configuration from `--config` or the default location.
pub fn load_config(path: Option<&Path>) -> PipelineConfig {
    match path {
        Some(path) => config::load_config_from(path),
        None => config::load_config(),
    }
}

/// Frame counts gathered while replaying a recording.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReplayCounts {
    pub frames: usize,
    pub admitted: usize,
    pub dropped: usize,
    pub ignored: usize,
}

impl ReplayCounts {
    fn record(&mut self, decision: &FrameDecision) {
        self.frames += 1;
        match decision {
            FrameDecision::Admitted { .. } => self.admitted += 1,
            FrameDecision::Dropped { .. } => self.dropped += 1,
            FrameDecision::Ignored(_) => self.ignored += 1,
        }
    }
}

#[derive(Debug, Serialize)]
struct ReplayReport {
    session: String,
    directory: PathBuf,
    archive: Option<PathBuf>,
    #[serde(flatten)]
    counts: ReplayCounts,
    exported: usize,
    failed: usize,
    manifest: photocap_common::ManifestModel,
}

/// Options for `photocap replay`.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    pub frames: PathBuf,
    pub root: Option<PathBuf>,
    pub no_archive: bool,
    pub rtk: bool,
    pub resolution: Option<ImageResolution>,
    pub orientation: Option<DisplayOrientation>,
}

/// Feed a recorded frame stream through the pipeline as one session.
pub async fn replay(mut config: PipelineConfig, options: ReplayOptions, out: Output) -> ExitCode {
    if let Some(root) = options.root {
        config.storage.root = Some(root);
    }
    if options.rtk {
        config.capture.rtk = true;
    }
    if let Some(resolution) = options.resolution {
        config.capture.export_resolution = resolution;
    }
    if let Some(orientation) = options.orientation {
        config.export.display_orientation = orientation;
    }

    let mut root = config.storage.resolve_root();
    if root.is_relative() {
        match std::env::current_dir() {
            Ok(cwd) => root = cwd.join(root),
            Err(e) => {
                out.error(&format!("Cannot resolve {}: {}", root.display(), e));
                return ExitCode::GeneralError;
            }
        }
    }
    match validate_storage_root(&root) {
        Ok(root) => config.storage.root = Some(root),
        Err(e) => {
            out.error(&e.to_string());
            return ExitCode::InvalidArguments;
        }
    }

    let mut source = match RecordedFrames::open(&options.frames) {
        Ok(source) => source,
        Err(e) => {
            out.error(&format!("{}: {}", options.frames.display(), e));
            return ExitCode::from(&e);
        }
    };

    let archive = config.archive.enabled && !options.no_archive;
    let mut pipeline = KeyframePipeline::new(config);
    if let Err(e) = pipeline.start().await {
        out.error(&e.to_string());
        return ExitCode::from(&e);
    }

    let mut counts = ReplayCounts::default();
    let mut gps = LocationModel::default();
    let mut rtk: Option<LocationModel> = None;
    let mut source_error = None;

    loop {
        match source.current_frame() {
            Ok(Some(next)) => {
                if next.gps.is_some() || next.rtk.is_some() {
                    if let Some(fix) = next.gps {
                        gps = fix;
                    }
                    if next.rtk.is_some() {
                        rtk = next.rtk;
                    }
                    pipeline.set_location(gps.clone(), rtk.clone());
                }
                let decision = pipeline.handle_frame(next.frame);
                counts.record(&decision);
                // Let the export worker run between frames
                tokio::task::yield_now().await;
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Stopping replay at a bad frame: {}", e);
                source_error = Some(e);
                break;
            }
        }
    }
    info!(
        "Replayed {} frames: {} admitted, {} dropped, {} ignored",
        counts.frames, counts.admitted, counts.dropped, counts.ignored
    );

    let on_progress: Option<ProgressCallback> = if archive && !out.quiet && !out.json {
        Some(Box::new(|ratio: f64| {
            eprint!("\r{}", colors::progress(ratio));
            if ratio >= 1.0 {
                eprintln!();
            }
        }))
    } else {
        None
    };

    let summary = match pipeline.stop(archive, on_progress).await {
        Ok(summary) => summary,
        Err(e) => {
            out.error(&e.to_string());
            return ExitCode::from(&e);
        }
    };

    let failed = summary.failed;
    let report = ReplayReport {
        session: summary.name,
        directory: summary.directory,
        archive: summary.archive,
        counts,
        exported: summary.exported,
        failed: summary.failed,
        manifest: summary.manifest,
    };

    let code = if out.json {
        out.print_json(&report)
    } else {
        if !out.quiet {
            print_replay_report(&report);
        }
        ExitCode::Success
    };

    if let Some(e) = source_error {
        out.error(&format!("{}: {}", options.frames.display(), e));
        return ExitCode::from(&e);
    }
    if failed > 0 {
        out.error(&format!("{} keyframe(s) failed to export", failed));
        return ExitCode::ExportFailed;
    }
    code
}

fn print_replay_report(report: &ReplayReport) {
    println!("{} {}", colors::header("Session"), report.session);
    let rows = [
        ("frames", report.counts.frames),
        ("admitted", report.counts.admitted),
        ("dropped", report.counts.dropped),
        ("ignored", report.counts.ignored),
        ("exported", report.exported),
        ("failed", report.failed),
    ];
    for (label, value) in rows {
        println!(
            "  {} {}",
            colors::pad_left(label, 9, colors::dim),
            colors::number(&value.to_string())
        );
    }
    match &report.archive {
        Some(archive) => println!(
            "{} {}",
            colors::success("Archived to"),
            colors::path(&archive.display().to_string())
        ),
        None => println!(
            "{} {}",
            colors::success("Written to"),
            colors::path(&report.directory.display().to_string())
        ),
    }
}

#[derive(Debug, Serialize)]
struct GpsReport {
    file: PathBuf,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

fn format_dms(dms: &Dms) -> String {
    format!(
        "{}/{} {}/{} {}/{}",
        dms.degrees.num,
        dms.degrees.den,
        dms.minutes.num,
        dms.minutes.den,
        dms.seconds.num,
        dms.seconds.den
    )
}

fn print_slot(label: &str, slot: Option<&Dms>) {
    match slot {
        Some(dms) => println!(
            "  {} {}  {}",
            colors::pad_left(label, 9, colors::dim),
            colors::number(&format!("{:.6}", dms.to_degrees())),
            colors::dim(&format_dms(dms))
        ),
        None => println!(
            "  {} {}",
            colors::pad_left(label, 9, colors::dim),
            colors::dim("no slot")
        ),
    }
}

/// Overwrite the GPS latitude and longitude stored in a photo.
pub fn patch_gps(file: &Path, latitude: f64, longitude: f64, out: Output) -> ExitCode {
    if let Err(e) = validate_geo_coordinates(latitude, longitude) {
        out.error(&e.to_string());
        return ExitCode::InvalidArguments;
    }
    if (latitude < 0.0 || longitude < 0.0) && !out.quiet {
        // Hemisphere lives in the reference tags, which are not rewritten
        eprintln!(
            "{}",
            colors::warning("writing absolute values; GPS reference tags are left unchanged")
        );
    }

    let offsets = match patch_gps_coordinates(file, latitude.abs(), longitude.abs()) {
        Ok(offsets) => offsets,
        Err(e) => {
            out.error(&format!("{}: {}", file.display(), e));
            return ExitCode::from(&e);
        }
    };

    if offsets.latitude.is_none() && offsets.longitude.is_none() {
        out.error(&format!("{}: no GPS coordinate slots", file.display()));
        return ExitCode::PatchFailed;
    }

    if out.json {
        return out.print_json(&GpsReport {
            file: file.to_path_buf(),
            latitude: offsets.latitude.map(|_| latitude.abs()),
            longitude: offsets.longitude.map(|_| longitude.abs()),
        });
    }
    if !out.quiet {
        println!(
            "{} {}",
            colors::success("Patched"),
            colors::path(&file.display().to_string())
        );
    }
    ExitCode::Success
}

/// Print the GPS latitude and longitude stored in a photo.
pub fn inspect_gps(file: &Path, out: Output) -> ExitCode {
    let coordinates = match read_gps_coordinates(file) {
        Ok(coordinates) => coordinates,
        Err(e) => {
            out.error(&format!("{}: {}", file.display(), e));
            return ExitCode::from(&e);
        }
    };

    if out.json {
        return out.print_json(&GpsReport {
            file: file.to_path_buf(),
            latitude: coordinates.latitude.map(|d| d.to_degrees()),
            longitude: coordinates.longitude.map(|d| d.to_degrees()),
        });
    }

    println!("{}", colors::path(&file.display().to_string()));
    print_slot("latitude", coordinates.latitude.as_ref());
    print_slot("longitude", coordinates.longitude.as_ref());
    ExitCode::Success
}

#[derive(Debug, Serialize)]
struct ArchiveReport {
    session: String,
    archive: PathBuf,
}

/// Zip an existing session directory into `<name>-save.zip` next to it.
pub fn archive(config: &PipelineConfig, session_dir: &Path, overwrite: bool, out: Output) -> ExitCode {
    let session = match CaptureSession::open(session_dir) {
        Ok(session) => session,
        Err(e) => {
            out.error(&e.to_string());
            return ExitCode::from(&e);
        }
    };

    match session.archive(overwrite, config.archive.keep_directory) {
        Ok(path) => {
            if out.json {
                return out.print_json(&ArchiveReport {
                    session: session.name().to_string(),
                    archive: path,
                });
            }
            if !out.quiet {
                println!(
                    "{} {}",
                    colors::success("Archived to"),
                    colors::path(&path.display().to_string())
                );
            }
            ExitCode::Success
        }
        Err(e) => {
            out.error(&e.to_string());
            ExitCode::from(&e)
        }
    }
}

/// Print the effective configuration as JSON.
pub fn config_show(config: &PipelineConfig, out: Output) -> ExitCode {
    out.print_json(config)
}

/// Print the configuration file path.
pub fn config_path(explicit: Option<&Path>, out: Output) -> ExitCode {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match config::config_path() {
            Ok(path) => path,
            Err(e) => {
                out.error(&e);
                return ExitCode::GeneralError;
            }
        },
    };

    if out.json {
        return out.print_json(&serde_json::json!({ "path": path }));
    }
    println!("{}", path.display());
    ExitCode::Success
}
