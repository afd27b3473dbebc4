//! Runtime configuration for the scan engine.
//!
//! Loaded from `config.toml` under the storage root. A missing file yields
//! defaults; a malformed one is an error so typos don't silently point the
//! scanner at the wrong server.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScanError};
use crate::storage::StorageConfig;
use crate::types::FacingMode;

pub const API_BASE_ENV: &str = "QR_SCAN_API_BASE";
pub const AUTH_TOKEN_ENV: &str = "QR_SCAN_AUTH_TOKEN";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub api: ApiConfig,
    pub capture: CaptureConfig,
    pub cascade: CascadeConfig,
    pub signal: SignalConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3001/api".to_string(),
            auth_token: None,
            timeout_ms: 8_000,
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Resolution hints passed to the camera backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub facing: FacingMode,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            facing: FacingMode::Environment,
            ideal_width: 1920,
            ideal_height: 1080,
            min_width: 640,
            min_height: 480,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CascadeConfig {
    pub sample_interval_ms: u64,
    pub debounce_ms: u64,
    pub frame_max_dimension: u32,
    pub image_max_dimension: u32,
    pub continuous_poll_ms: u64,
    pub native_detector: bool,
    /// Polls the live surface with a plain decode pass (both polarities).
    /// While this loop runs, `frame_sampling` stays idle, so the defaults never
    /// reach the tone, downscale and crop passes. Turn it off on cameras
    /// that need them.
    pub continuous_decoder: bool,
    /// Preprocessing sampler; used only when no continuous loop is running.
    pub frame_sampling: bool,
}

impl Default for CascadeConfig {
    fn default() -> Self {
        Self {
            sample_interval_ms: 120,
            debounce_ms: 300,
            frame_max_dimension: 1024,
            image_max_dimension: 1280,
            continuous_poll_ms: 50,
            native_detector: true,
            continuous_decoder: true,
            frame_sampling: true,
        }
    }
}

impl CascadeConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn continuous_poll(&self) -> Duration {
        Duration::from_millis(self.continuous_poll_ms.max(1))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Overrides the marker location under the storage root.
    pub marker_file: Option<PathBuf>,
}

impl SignalConfig {
    pub fn marker_path(&self, storage: &StorageConfig) -> PathBuf {
        self.marker_file
            .clone()
            .unwrap_or_else(|| storage.attendance_marker_file())
    }
}

impl ScanConfig {
    /// Loads the config file (explicit path or the storage default) and applies
    /// environment overrides.
    pub fn load(path: Option<PathBuf>, storage: &StorageConfig) -> Result<Self> {
        let mut config = Self::load_file(path.unwrap_or_else(|| storage.config_file()))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No scan config file; using defaults");
            return Ok(Self::default());
        }

        let content = fs_err::read_to_string(&path).map_err(|source| ScanError::Io {
            context: format!("reading config {}", path.display()),
            source,
        })?;
        toml::from_str::<ScanConfig>(&content).map_err(|err| ScanError::ConfigMalformed {
            path,
            details: err.to_string(),
        })
    }

    /// Applies `QR_SCAN_API_BASE` / `QR_SCAN_AUTH_TOKEN`. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        if let Some(base) = present(API_BASE_ENV) {
            self.api.base_url = base;
        }
        if let Some(token) = present(AUTH_TOKEN_ENV) {
            self.api.auth_token = Some(token);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let storage = StorageConfig::with_root(temp_dir.path().to_path_buf());
        let config = ScanConfig::load_file(storage.config_file()).expect("load config");
        assert_eq!(config, ScanConfig::default());
        assert_eq!(config.api.timeout(), Duration::from_secs(8));
        assert_eq!(config.cascade.sample_interval(), Duration::from_millis(120));
    }

    #[test]
    fn test_load_parses_partial_sections() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
[api]
base_url = "https://ctxh.example.edu/api"
timeout_ms = 3000

[capture]
facing = "user"

[cascade]
continuous_decoder = false
debounce_ms = 500
"#,
        )
        .expect("write config");

        let config = ScanConfig::load_file(path).expect("load config");
        assert_eq!(config.api.base_url, "https://ctxh.example.edu/api");
        assert_eq!(config.api.timeout_ms, 3000);
        assert_eq!(config.api.auth_token, None);
        assert_eq!(config.capture.facing, FacingMode::User);
        assert_eq!(config.capture.ideal_width, 1920);
        assert!(!config.cascade.continuous_decoder);
        assert!(config.cascade.native_detector);
        assert_eq!(config.cascade.debounce_ms, 500);
        assert_eq!(config.cascade.frame_max_dimension, 1024);
    }

    #[test]
    fn test_load_rejects_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "[api\nbase_url = ").expect("write config");

        let err = ScanConfig::load_file(path).expect_err("malformed");
        assert!(matches!(err, ScanError::ConfigMalformed { .. }));
    }

    #[test]
    fn test_env_overrides_skip_blank_values() {
        let mut config = ScanConfig::default();
        config.apply_env(|key| match key {
            API_BASE_ENV => Some("https://api.example.edu".to_string()),
            AUTH_TOKEN_ENV => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.api.base_url, "https://api.example.edu");
        assert_eq!(config.api.auth_token, None);
    }

    #[test]
    fn test_marker_path_override() {
        let storage = StorageConfig::with_root(PathBuf::from("/tmp/qr"));
        let mut signal = SignalConfig::default();
        assert_eq!(
            signal.marker_path(&storage),
            storage.attendance_marker_file()
        );
        signal.marker_file = Some(PathBuf::from("/var/run/marker"));
        assert_eq!(signal.marker_path(&storage), PathBuf::from("/var/run/marker"));
    }
}
