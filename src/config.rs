//! Persisted settings and config directory resolution
//!
//! Settings live in `vidcache.json` inside the config directory:
//! 1. CLI `--config-dir`
//! 2. `VIDCACHE_CONFIG_DIR` environment variable
//! 3. Current directory IF it already holds `vidcache.json` or `vidcache.log`
//! 4. Platform config directory from dirs-next, joined with `vidcache`
//!
//! Platform paths:
//! - Linux: ~/.config/vidcache/
//! - macOS: ~/Library/Application Support/vidcache/
//! - Windows: %APPDATA%\vidcache\

use anyhow::{Context, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::entities::Size;

/// Settings file name
pub const SETTINGS_FILE: &str = "vidcache.json";
/// Default log file name for `--log` without a value
pub const LOG_FILE: &str = "vidcache.log";
/// Environment override of the config directory
pub const CONFIG_DIR_ENV: &str = "VIDCACHE_CONFIG_DIR";

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Cache & Memory
    pub cache_memory_percent: f64,     // 5-95% of available (default 75%)
    pub reserve_system_memory_gb: f64, // Reserve for system (default 2.0 GB)

    // Workers
    pub workers_override: usize, // 0 = auto

    // Playback
    pub prebuffer_capacity: usize, // Frames decoded ahead in pre-buffering mode
    pub image_sequence_fps: f64,   // Frame rate assumed for image sequences

    // Summaries
    pub thumbnails: usize,
    pub thumbnail_max_size: Size,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_memory_percent: 75.0,
            reserve_system_memory_gb: 2.0,
            workers_override: 0,
            prebuffer_capacity: crate::core::prebuffer::DEFAULT_CAPACITY,
            image_sequence_fps: 25.0,
            thumbnails: 4,
            thumbnail_max_size: Size::new(200, 150),
        }
    }
}

impl Settings {
    /// Cache budget as a fraction of available memory, clamped to 5-95%.
    pub fn cache_memory_fraction(&self) -> f64 {
        (self.cache_memory_percent / 100.0).clamp(0.05, 0.95)
    }

    /// Load from a JSON file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings: {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))?;
        debug!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load from the config directory, defaults if the file does not exist.
    pub fn load_or_default(config: &PathConfig) -> Result<Self> {
        let path = config_file(SETTINGS_FILE, config);
        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write settings: {}", path.display()))?;
        debug!("Saved settings to {}", path.display());
        Ok(())
    }
}

/// Configuration for overriding default application paths
#[derive(Debug, Clone, Default)]
pub struct PathConfig {
    /// Custom config directory (from CLI or ENV)
    pub config_dir: Option<PathBuf>,
}

impl PathConfig {
    /// Priority: CLI args → ENV var → None (use defaults)
    pub fn from_env_and_cli(cli_dir: Option<PathBuf>) -> Self {
        let config_dir = cli_dir.or_else(|| std::env::var(CONFIG_DIR_ENV).ok().map(PathBuf::from));
        Self { config_dir }
    }
}

/// Get path to a file in the config directory
pub fn config_file(name: &str, config: &PathConfig) -> PathBuf {
    get_config_dir(config).join(name)
}

/// Create the config directory if missing
pub fn ensure_dirs(config: &PathConfig) -> Result<()> {
    let dir = get_config_dir(config);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    }
    Ok(())
}

fn has_local_config_files(dir: &Path) -> bool {
    [SETTINGS_FILE, LOG_FILE].iter().any(|f| dir.join(f).exists())
}

/// Get the configuration directory
pub fn get_config_dir(config: &PathConfig) -> PathBuf {
    if let Some(dir) = &config.config_dir {
        return dir.clone();
    }

    if let Ok(current_dir) = std::env::current_dir() {
        if has_local_config_files(&current_dir) {
            return current_dir;
        }
    }

    if let Some(dir) = dirs_next::config_dir() {
        return dir.join("vidcache");
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_file_with_custom_dir() {
        let config = PathConfig {
            config_dir: Some(PathBuf::from("/custom")),
        };
        assert_eq!(config_file("test.json", &config), PathBuf::from("/custom/test.json"));
    }

    #[test]
    fn test_cli_beats_env() {
        let config = PathConfig::from_env_and_cli(Some(PathBuf::from("/from/cli")));
        assert_eq!(config.config_dir, Some(PathBuf::from("/from/cli")));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.cache_memory_fraction(), 0.75);
        assert_eq!(settings.prebuffer_capacity, 25);
        assert_eq!(settings.thumbnail_max_size, Size::new(200, 150));
    }

    /// Partial files fall back to defaults for missing keys.
    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, r#"{ "prebuffer_capacity": 10, "cache_memory_percent": 50.0 }"#).unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.prebuffer_capacity, 10);
        assert_eq!(settings.cache_memory_fraction(), 0.5);
        assert_eq!(settings.image_sequence_fps, 25.0);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let config = PathConfig {
            config_dir: Some(dir.path().to_path_buf()),
        };

        let missing = Settings::load_or_default(&config).unwrap();
        assert_eq!(missing, Settings::default());

        let settings = Settings {
            thumbnails: 8,
            ..Default::default()
        };
        settings.save(&config_file(SETTINGS_FILE, &config)).unwrap();
        assert_eq!(Settings::load_or_default(&config).unwrap().thumbnails, 8);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
