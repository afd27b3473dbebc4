//! Storage configuration and path management for the scanner.
//!
//! Every file the engine touches lives under one root so tests can swap it
//! for a temp directory with `StorageConfig::with_root()`.

use std::path::{Path, PathBuf};

const ROOT_DIR_NAME: &str = ".qr-attendance";

/// Central configuration for all scanner storage paths.
///
/// Production code uses `StorageConfig::default()` which points to `~/.qr-attendance/`.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        // Sandboxed hosts (kiosks, CI) may have no home directory.
        let base = dirs::home_dir().unwrap_or_else(std::env::temp_dir);
        Self {
            root: base.join(ROOT_DIR_NAME),
        }
    }
}

impl StorageConfig {
    /// Creates a StorageConfig with a custom root directory.
    pub fn with_root(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to config.toml.
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Path to the logs/ directory used by the CLI's rolling appender.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Marker holding the epoch-millisecond time of the last check-in.
    pub fn attendance_marker_file(&self) -> PathBuf {
        self.root.join("ATTENDANCE_UPDATED_AT")
    }
}
