//! photocap Command-Line Interface
//!
//! Replays recorded posed-frame streams through the keyframe pipeline and
//! offers the session and GPS tooling on its own for scripting.

mod colors;
mod commands;
mod exit_codes;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use commands::{Output, ReplayOptions};
use exit_codes::ExitCode;
use photocap_common::logging::{app_log_path, ensure_log_dir, LOG_FILE_PREFIX};
use photocap_common::ImageResolution;
use photocap_service::capture::DisplayOrientation;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// photocap - keyframe capture pipeline CLI
#[derive(Parser, Debug)]
#[command(name = "photocap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output in JSON format for scripting
    #[arg(long, global = true)]
    json: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose output (debug logging)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to a daily file in the platform log directory
    #[arg(long, global = true)]
    log_file: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Replay a JSON-lines frame recording as one capture session
    Replay {
        /// Recorded frames, one JSON object per line
        frames: PathBuf,

        /// Storage root for the session (overrides the configured root)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Leave the session directory unzipped
        #[arg(long)]
        no_archive: bool,

        /// Mark the session as captured with an RTK receiver
        #[arg(long)]
        rtk: bool,

        /// Photo resolution tier: maximum, high or medium
        #[arg(long, value_parser = parse_resolution)]
        resolution: Option<ImageResolution>,

        /// Display orientation used for the view matrices
        #[arg(long, value_parser = parse_orientation)]
        orientation: Option<DisplayOrientation>,
    },
    /// Overwrite the GPS coordinates stored in a JPEG
    PatchGps {
        /// Photo to patch in place
        file: PathBuf,

        /// Latitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in decimal degrees
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },
    /// Print the GPS coordinates stored in a JPEG
    InspectGps {
        /// Photo to read
        file: PathBuf,
    },
    /// Zip an existing session directory
    Archive {
        /// Session directory (named yyyy-MM-dd-HH-mm-ss)
        session_dir: PathBuf,

        /// Replace an existing archive of the same name
        #[arg(long)]
        overwrite: bool,
    },
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Print the configuration file path
    Path,
}

fn parse_resolution(s: &str) -> Result<ImageResolution, String> {
    ImageResolution::parse(s).ok_or_else(|| format!("unknown resolution '{}'", s))
}

fn parse_orientation(s: &str) -> Result<DisplayOrientation, String> {
    DisplayOrientation::parse(s).ok_or_else(|| format!("unknown orientation '{}'", s))
}

/// Install the stderr subscriber and, if asked, a daily rolling file layer.
///
/// The returned guard must live until exit so buffered file logs are flushed.
fn init_logging(verbose: bool, log_file: bool) -> Option<WorkerGuard> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let (file_layer, guard) = if log_file {
        match ensure_log_dir() {
            Ok(dir) => {
                let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                (
                    Some(fmt::layer().with_ansi(false).with_writer(writer)),
                    Some(guard),
                )
            }
            Err(e) => {
                eprintln!(
                    "{}",
                    colors::warning(&format!("File logging disabled: {}", e))
                );
                (None, None)
            }
        }
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    if guard.is_some() {
        tracing::debug!("Logging to {}.<date>", app_log_path().display());
    }
    guard
}

fn main() {
    let cli = Cli::parse();
    let guard = init_logging(cli.verbose, cli.log_file);

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{}", colors::error(&format!("Failed to create Tokio runtime: {}", e)));
            std::process::exit(ExitCode::GeneralError.as_i32());
        }
    };

    let exit_code = runtime.block_on(run(cli));
    drop(runtime);
    drop(guard);
    std::process::exit(exit_code.as_i32());
}

async fn run(cli: Cli) -> ExitCode {
    let out = Output {
        json: cli.json,
        quiet: cli.quiet,
    };
    let config = commands::load_config(cli.config.as_deref());

    match cli.command {
        Commands::Replay {
            frames,
            root,
            no_archive,
            rtk,
            resolution,
            orientation,
        } => {
            let options = ReplayOptions {
                frames,
                root,
                no_archive,
                rtk,
                resolution,
                orientation,
            };
            commands::replay(config, options, out).await
        }
        Commands::PatchGps { file, lat, lon } => commands::patch_gps(&file, lat, lon, out),
        Commands::InspectGps { file } => commands::inspect_gps(&file, out),
        Commands::Archive {
            session_dir,
            overwrite,
        } => commands::archive(&config, &session_dir, overwrite, out),
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_show(&config, out),
            ConfigAction::Path => commands::config_path(cli.config.as_deref(), out),
        },
    }
}
