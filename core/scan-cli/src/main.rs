//! qr-checkin: command-line QR attendance check-in.
//!
//! Runs the same engine as the camera clients against an image file or a raw
//! decoded string, for kiosks fed by a scanner gun and for scripted checks.
//!
//! ## Subcommands
//!
//! - `image`: decode an image, verify the token and check in
//! - `payload`: verify and check in a raw decoded QR string
//! - `decode`: decode an image and print the payload, no network
//! - `marker`: print the time of the last successful check-in

mod inspect;
mod logging;
mod scan;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use scan_core::{ScanConfig, StorageConfig};

#[derive(Parser)]
#[command(name = "qr-checkin")]
#[command(about = "QR attendance check-in")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ~/.qr-attendance/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of a message
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decode a QR image, verify it and check in
    Image {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Verify and check in a decoded QR string
    Payload {
        #[arg(value_name = "RAW")]
        raw: String,
    },

    /// Decode a QR image and print its payload without contacting the server
    Decode {
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },

    /// Print when the last check-in on this machine happened
    Marker,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let storage = StorageConfig::default();
    let _logging_guard = logging::init(&storage.logs_dir());

    let config = match ScanConfig::load(cli.config.clone(), &storage) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load config");
            eprintln!("qr-checkin: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Image { path } => scan::image(&config, &storage, &path, cli.json).await,
        Commands::Payload { raw } => scan::payload(&config, &storage, raw, cli.json).await,
        Commands::Decode { path } => inspect::decode(&config, &path, cli.json),
        Commands::Marker => inspect::marker(&config, &storage, cli.json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "qr-checkin failed");
            eprintln!("qr-checkin: {}", e);
            ExitCode::FAILURE
        }
    }
}
