use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    client::{DEFAULT_BASE_URL, HttpLogLevel, Units},
    controller::OverlapPolicy,
};

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "WEATHER_LOOKUP_API_KEY";

/// Top-level configuration stored on disk.
///
/// Example TOML:
/// ```toml
/// api_key = "..."
/// units = "metric"
/// http_log = "basic"
/// overlap = "concurrent"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// OpenWeatherMap API key.
    pub api_key: Option<String>,

    /// Override for the API base URL; mostly useful for pointing at a local stub.
    pub base_url: Option<String>,

    #[serde(default)]
    pub units: Units,

    #[serde(default)]
    pub http_log: HttpLogLevel,

    #[serde(default)]
    pub overlap: OverlapPolicy,
}

impl Config {
    /// Return the API key, or an error with a hint on how to set one.
    pub fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty()).ok_or_else(|| {
            anyhow!(
                "No API key configured.\n\
                 Hint: run `weather-lookup configure` or set {API_KEY_ENV}."
            )
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    /// Load config from disk (or an empty default) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_from(&Self::config_file_path()?)?;
        cfg.apply_env_override(std::env::var(API_KEY_ENV).ok());
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            // First run: no config file, return empty.
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "weather-lookup", "weather-lookup")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    fn apply_env_override(&mut self, key: Option<String>) {
        if let Some(key) = key.filter(|k| !k.trim().is_empty()) {
            tracing::debug!("Using API key from {API_KEY_ENV}");
            self.api_key = Some(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_key_errors_when_not_set() {
        let cfg = Config::default();
        let err = cfg.api_key().unwrap_err();

        assert!(err.to_string().contains("No API key configured"));
        assert!(err.to_string().contains("weather-lookup configure"));
    }

    #[test]
    fn blank_api_key_counts_as_missing() {
        let cfg = Config { api_key: Some("   ".into()), ..Config::default() };
        assert!(cfg.api_key().is_err());
    }

    #[test]
    fn base_url_defaults_to_openweathermap() {
        let mut cfg = Config::default();
        assert_eq!(cfg.base_url(), DEFAULT_BASE_URL);

        cfg.base_url = Some("http://localhost:8080/".into());
        assert_eq!(cfg.base_url(), "http://localhost:8080/");
    }

    #[test]
    fn env_override_replaces_stored_key() {
        let mut cfg = Config { api_key: Some("FILE".into()), ..Config::default() };

        cfg.apply_env_override(Some(String::new()));
        assert_eq!(cfg.api_key().unwrap(), "FILE");

        cfg.apply_env_override(Some("ENV".into()));
        assert_eq!(cfg.api_key().unwrap(), "ENV");
    }

    #[test]
    fn missing_file_loads_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load_from(&dir.path().join("absent.toml")).unwrap();

        assert!(cfg.api_key.is_none());
        assert_eq!(cfg.units, Units::Standard);
        assert_eq!(cfg.overlap, OverlapPolicy::Concurrent);
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg").join("config.toml");
        let cfg = Config {
            api_key: Some("KEY".into()),
            base_url: None,
            units: Units::Metric,
            http_log: HttpLogLevel::Body,
            overlap: OverlapPolicy::CancelPrevious,
        };

        cfg.save_to(&path).unwrap();
        let loaded = Config::load_from(&path).unwrap();

        assert_eq!(loaded.api_key.as_deref(), Some("KEY"));
        assert_eq!(loaded.units, Units::Metric);
        assert_eq!(loaded.http_log, HttpLogLevel::Body);
        assert_eq!(loaded.overlap, OverlapPolicy::CancelPrevious);
    }

    #[test]
    fn parses_lowercase_enums() {
        let cfg: Config = toml::from_str(
            "api_key = \"K\"\nunits = \"imperial\"\nhttp_log = \"none\"\noverlap = \"ignore_while_loading\"\n",
        )
        .unwrap();

        assert_eq!(cfg.units, Units::Imperial);
        assert_eq!(cfg.http_log, HttpLogLevel::None);
        assert_eq!(cfg.overlap, OverlapPolicy::IgnoreWhileLoading);
    }
}
