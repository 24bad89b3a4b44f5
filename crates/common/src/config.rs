//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable overriding the transcoder binary.
pub const FFMPEG_ENV: &str = "VBR_FFMPEG";

/// Environment variable overriding the prober binary.
pub const FFPROBE_ENV: &str = "VBR_FFPROBE";

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External binaries, temp storage and timeouts.
    pub media: MediaConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Where the external tools live and how long to wait on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Transcoder executable (name on PATH or absolute path).
    pub ffmpeg: PathBuf,

    /// Prober executable (name on PATH or absolute path).
    pub ffprobe: PathBuf,

    /// Parent directory for the temporary-file arena. System temp dir when unset.
    pub tmp_root: Option<PathBuf>,

    /// Probe timeout for local files.
    pub probe_timeout_secs: u64,

    /// Probe timeout for URLs and live streams.
    pub url_probe_timeout_secs: u64,

    /// Timeout for the `-version` startup check.
    pub version_check_timeout_secs: u64,

    /// Timeout for downloading remote image backgrounds.
    pub download_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vbr_compose_engine=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            tmp_root: None,
            probe_timeout_secs: 5,
            url_probe_timeout_secs: 10,
            version_check_timeout_secs: 10,
            download_timeout_secs: 30,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    /// Binary paths from the environment take precedence over the file.
    pub fn load() -> Self {
        let mut config = Self::load_from(&config_file_path());
        config.media.apply_env_overrides();
        config
    }

    /// Load config from an explicit path, falling back to defaults.
    pub fn load_from(config_path: &Path) -> Self {
        if config_path.exists() {
            match std::fs::read_to_string(config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(&config_file_path())
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, config_path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

impl MediaConfig {
    fn apply_env_overrides(&mut self) {
        if let Some(ffmpeg) = std::env::var_os(FFMPEG_ENV) {
            self.ffmpeg = PathBuf::from(ffmpeg);
        }
        if let Some(ffprobe) = std::env::var_os(FFPROBE_ENV) {
            self.ffprobe = PathBuf::from(ffprobe);
        }
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("vbr").join("config.json")
}
