use std::{
    env, fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    compositor::{CompositorSettings, DEFAULT_REFRESH_RATE_HZ, DEFAULT_SEEK_TOLERANCE_SECONDS},
    history::DEFAULT_MAX_HISTORY,
    media_cache::{CacheLimits, MAX_CACHE_BYTES, MAX_CACHE_ENTRIES},
    model::MatchConfig,
    waveform::DEFAULT_SAMPLE_COUNT,
};

pub const CONFIG_PATH_ENV: &str = "CLIPCLASH_CONFIG_PATH";
pub const CONFIG_FILE_NAME: &str = "clipclash.config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub history: HistoryConfig,
    pub cache: CacheConfig,
    pub compositor: CompositorConfig,
    pub waveform: WaveformConfig,
    pub matches: MatchesConfig,
    pub diagnostics: DiagnosticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HistoryConfig {
    pub max_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CompositorConfig {
    pub refresh_rate_hz: f64,
    pub seek_tolerance_seconds: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WaveformConfig {
    pub default_sample_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MatchesConfig {
    pub default_video_tracks: usize,
    pub default_audio_tracks: usize,
    pub default_timeline_duration: f64,
    pub store_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiagnosticsConfig {
    pub rust_log_filter: String,
    pub trace_file_prefix: String,
    pub logs_dir: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_HISTORY,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: MAX_CACHE_ENTRIES,
            max_bytes: MAX_CACHE_BYTES,
        }
    }
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            refresh_rate_hz: DEFAULT_REFRESH_RATE_HZ,
            seek_tolerance_seconds: DEFAULT_SEEK_TOLERANCE_SECONDS,
        }
    }
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            default_sample_count: DEFAULT_SAMPLE_COUNT,
        }
    }
}

impl Default for MatchesConfig {
    fn default() -> Self {
        let defaults = MatchConfig::default();
        Self {
            default_video_tracks: defaults.max_video_tracks,
            default_audio_tracks: defaults.max_audio_tracks,
            default_timeline_duration: defaults.timeline_duration,
            store_dir: PathBuf::from("data/matches"),
        }
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            rust_log_filter: crate::diagnostics::DEFAULT_LOG_FILTER.to_string(),
            trace_file_prefix: "clipclash".to_string(),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

impl AppConfig {
    /// # Errors
    /// Fails when no file is found or it is not valid TOML.
    pub fn load() -> Result<Self> {
        let config_path = discover_config_path().with_context(|| {
            format!("failed to locate {CONFIG_FILE_NAME}; looked in cwd and parent directory")
        })?;
        Self::load_from(&config_path)
    }

    /// # Errors
    /// Fails when the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("failed to parse config TOML from {}", path.display()))?;
        debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    #[must_use]
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "using default configuration");
                Self::default()
            }
        }
    }

    #[must_use]
    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            max_entries: self.cache.max_entries,
            max_bytes: self.cache.max_bytes,
        }
    }

    #[must_use]
    pub fn compositor_settings(&self) -> CompositorSettings {
        CompositorSettings {
            seek_tolerance_seconds: self.compositor.seek_tolerance_seconds,
            refresh_rate_hz: self.compositor.refresh_rate_hz,
        }
    }

    #[must_use]
    pub fn match_config(&self) -> MatchConfig {
        MatchConfig {
            max_video_tracks: self.matches.default_video_tracks,
            max_audio_tracks: self.matches.default_audio_tracks,
            timeline_duration: self.matches.default_timeline_duration,
        }
    }
}

/// # Errors
/// Fails when none of the candidates exist.
pub fn discover_config_path() -> Result<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.is_file() {
            return Ok(path);
        }
        warn!(path = %path.display(), "{CONFIG_PATH_ENV} does not name a file");
    }

    let cwd = env::current_dir().context("failed to resolve current directory")?;
    let candidates = [
        cwd.join(CONFIG_FILE_NAME),
        cwd.join("..").join(CONFIG_FILE_NAME),
    ];

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| anyhow::anyhow!("{CONFIG_FILE_NAME} not found"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn partial_file_keeps_remaining_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[cache]\nmax_entries = 8\n\n[compositor]\nrefresh_rate_hz = 30.0")
            .expect("write config");

        let config = AppConfig::load_from(file.path()).expect("parse");
        assert_eq!(config.cache.max_entries, 8);
        assert_eq!(config.cache.max_bytes, MAX_CACHE_BYTES);
        assert!((config.compositor.refresh_rate_hz - 30.0).abs() < f64::EPSILON);
        assert_eq!(config.history.max_depth, 50);
        assert!((config.compositor_settings().seek_tolerance_seconds - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn defaults_match_documented_limits() {
        let config = AppConfig::default();
        assert_eq!(config.cache_limits(), CacheLimits::default());
        assert_eq!(config.cache.max_bytes, 157_286_400);
        assert_eq!(config.waveform.default_sample_count, 100);
        assert_eq!(config.match_config(), MatchConfig::default());
    }

    #[test]
    fn malformed_file_reports_path() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "[history\nmax_depth = ").expect("write config");
        let error = AppConfig::load_from(file.path()).expect_err("invalid toml");
        assert!(format!("{error:#}").contains("failed to parse config TOML"));
    }
}
