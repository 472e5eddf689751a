//! Layered configuration for the lumenwall appliance.
//!
//! Resolution order mirrors the teacher crate's scanner config loader:
//! 1. `$LUMENWALL_CONFIG_PATH` (TOML or JSON file)
//! 2. `$LUMENWALL_CONFIG_JSON` (inline JSON, handy for container overrides)
//! 3. a `lumenwall.toml` / `lumenwall.json` / `config/lumenwall.toml` next to
//!    the process, if present
//! 4. compiled-in defaults

pub mod error;

use std::{env, fs, path::Path, path::PathBuf};

use lumenwall_model::ChannelId;
use serde::{Deserialize, Serialize};

pub use error::ConfigError;

/// Source the active configuration was loaded from, surfaced for logging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigSource {
    #[default]
    Default,
    EnvPath(PathBuf),
    EnvInline,
    File(PathBuf),
}

/// Plain RGB triple used for border fill and overlay colors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for Rgb {
    fn default() -> Self {
        Rgb { r: 0, g: 0, b: 0 }
    }
}

fn default_catalog_host() -> String {
    "catalog.invalid".to_string()
}

fn default_vault_root() -> PathBuf {
    PathBuf::from("/mnt/sdcard/vault")
}

fn default_channels() -> Vec<String> {
    Vec::new()
}

fn default_cache_limit() -> usize {
    1000
}

fn default_terminal_failure_threshold() -> u32 {
    3
}

fn default_processing_indicator_timeout_ms() -> u64 {
    5_000
}

fn default_processing_indicator_failed_hold_ms() -> u64 {
    3_000
}

fn default_bus_acquire_ceiling_secs() -> u64 {
    120
}

fn default_stripe_height() -> u16 {
    80
}

fn default_stripe_floor() -> u16 {
    16
}

/// Top-level appliance configuration. Tune `channels` and the vault root to
/// point the scheduler at a real catalog/storage mount; the rest are safe to
/// leave at their defaults for a first boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Hostname of the catalog service, used to build origin URLs.
    #[serde(default = "default_catalog_host")]
    pub catalog_host: String,

    /// Root directory of the content-addressed vault on removable media.
    #[serde(default = "default_vault_root")]
    pub vault_root: PathBuf,

    /// Ordered channel ids the scheduler round-robins over. Capped at
    /// [`lumenwall_model::MAX_CHANNELS`]; extra entries are rejected at load
    /// time rather than silently truncated.
    #[serde(default = "default_channels")]
    pub channels: Vec<String>,

    /// Show the 1 Hz FPS overlay in the top-right corner.
    #[serde(default)]
    pub fps_overlay_enabled: bool,

    /// Show the tri-state processing indicator in the bottom-right corner.
    #[serde(default)]
    pub processing_indicator_enabled: bool,

    /// Border fill color used when the hardware scaler centers an image
    /// smaller than the panel.
    #[serde(default)]
    pub background_color: Rgb,

    /// Persisted panel rotation in degrees; must be 0, 90, 180, or 270.
    #[serde(default)]
    pub rotation_degrees: u16,

    /// Maximum vault objects kept on disk before LRU-by-mtime eviction
    /// kicks in. Plumbed through config so it can be tuned without a
    /// rebuild.
    #[serde(default = "default_cache_limit")]
    pub cache_limit: usize,

    /// Failure-counter value at which an asset becomes terminal and is
    /// skipped by the scheduler until explicitly cleared.
    #[serde(default = "default_terminal_failure_threshold")]
    pub terminal_failure_threshold: u32,

    /// How long the bus coordinator waits in total before giving up on a
    /// single download attempt.
    #[serde(default = "default_bus_acquire_ceiling_secs")]
    pub bus_acquire_ceiling_secs: u64,

    /// Processing-indicator timeout before flipping to the Failed state.
    #[serde(default = "default_processing_indicator_timeout_ms")]
    pub processing_indicator_timeout_ms: u64,

    /// How long the Failed state is held before returning to Idle.
    #[serde(default = "default_processing_indicator_failed_hold_ms")]
    pub processing_indicator_failed_hold_ms: u64,

    /// Default stripe height in rows, halved on allocation failure.
    #[serde(default = "default_stripe_height")]
    pub stripe_height: u16,

    /// Minimum stripe height the decode pipeline will degrade to.
    #[serde(default = "default_stripe_floor")]
    pub stripe_floor: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_host: default_catalog_host(),
            vault_root: default_vault_root(),
            channels: default_channels(),
            fps_overlay_enabled: false,
            processing_indicator_enabled: false,
            background_color: Rgb::default(),
            rotation_degrees: 0,
            cache_limit: default_cache_limit(),
            terminal_failure_threshold: default_terminal_failure_threshold(),
            bus_acquire_ceiling_secs: default_bus_acquire_ceiling_secs(),
            processing_indicator_timeout_ms:
                default_processing_indicator_timeout_ms(),
            processing_indicator_failed_hold_ms:
                default_processing_indicator_failed_hold_ms(),
            stripe_height: default_stripe_height(),
            stripe_floor: default_stripe_floor(),
        }
    }
}

impl AppConfig {
    /// Load configuration following the precedence documented on this
    /// module: env path, then inline env JSON, then a default file on disk,
    /// then compiled-in defaults.
    pub fn load_from_env() -> Result<(Self, ConfigSource), ConfigError> {
        if let Ok(path_str) = env::var("LUMENWALL_CONFIG_PATH") {
            if !path_str.trim().is_empty() {
                let path = PathBuf::from(path_str);
                let config = Self::load_from_file(&path)?;
                config.validate()?;
                return Ok((config, ConfigSource::EnvPath(path)));
            }
        }

        if let Ok(raw) = env::var("LUMENWALL_CONFIG_JSON") {
            if !raw.trim().is_empty() {
                let config = Self::parse_json(&raw)?;
                config.validate()?;
                return Ok((config, ConfigSource::EnvInline));
            }
        }

        if let Some(path) = Self::find_default_file() {
            let config = Self::load_from_file(&path)?;
            config.validate()?;
            return Ok((config, ConfigSource::File(path)));
        }

        let config = Self::default();
        config.validate()?;
        Ok((config, ConfigSource::Default))
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|err| {
            ConfigError::Read(path.display().to_string(), err.to_string())
        })?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::parse_json(&contents),
            Some("toml") | Some("tml") => toml::from_str(&contents)
                .map_err(|err| ConfigError::Toml(err.to_string())),
            _ => Self::parse_from_str(&contents),
        }
    }

    pub fn parse_from_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents)
            .map_err(|toml_err| ConfigError::Toml(toml_err.to_string()))
            .or_else(|_| Self::parse_json(contents))
    }

    pub fn parse_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw)
            .map_err(|err| ConfigError::Json(err.to_string()))
    }

    /// Channel ids as validated [`ChannelId`]s, enforcing the ≤16/≤63-byte
    /// constraints from the data model rather than deferring to the
    /// scheduler to discover malformed configuration at runtime.
    pub fn channel_ids(&self) -> Result<Vec<ChannelId>, ConfigError> {
        if self.channels.len() > lumenwall_model::MAX_CHANNELS {
            return Err(ConfigError::Validation(format!(
                "configured {} channels, maximum is {}",
                self.channels.len(),
                lumenwall_model::MAX_CHANNELS
            )));
        }
        self.channels
            .iter()
            .map(|raw| {
                ChannelId::new(raw.clone())
                    .map_err(|err| ConfigError::Validation(err.to_string()))
            })
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.channel_ids()?;
        if lumenwall_model::Rotation::from_degrees(self.rotation_degrees)
            .is_none()
        {
            return Err(ConfigError::Validation(format!(
                "rotation_degrees must be 0, 90, 180, or 270, got {}",
                self.rotation_degrees
            )));
        }
        if self.stripe_floor == 0 || self.stripe_floor > self.stripe_height {
            return Err(ConfigError::Validation(
                "stripe_floor must be > 0 and <= stripe_height".to_string(),
            ));
        }
        Ok(())
    }

    fn find_default_file() -> Option<PathBuf> {
        const CANDIDATES: &[&str] = &[
            "lumenwall.toml",
            "lumenwall.json",
            "config/lumenwall.toml",
            "config/lumenwall.json",
        ];

        CANDIDATES
            .iter()
            .map(Path::new)
            .find(|path| path.exists())
            .map(|path| path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.channel_ids().unwrap().is_empty());
    }

    #[test]
    fn rejects_too_many_channels() {
        let mut config = AppConfig::default();
        config.channels = (0..20).map(|i| format!("ch{i}")).collect();
        assert!(config.channel_ids().is_err());
    }

    #[test]
    fn rejects_invalid_rotation() {
        let mut config = AppConfig::default();
        config.rotation_degrees = 45;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parses_toml_round_trip() {
        let toml_src = r#"
            catalog_host = "frames.example.com"
            vault_root = "/mnt/sdcard/vault"
            channels = ["daily", "seasonal"]
            fps_overlay_enabled = true
            rotation_degrees = 90
        "#;
        let config = AppConfig::parse_from_str(toml_src).unwrap();
        assert_eq!(config.catalog_host, "frames.example.com");
        assert_eq!(config.channels, vec!["daily", "seasonal"]);
        assert!(config.fps_overlay_enabled);
        assert_eq!(config.rotation_degrees, 90);
    }

    #[test]
    fn load_from_file_reads_json_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lumenwall.json");
        fs::write(&path, r#"{"catalog_host": "json.example.com"}"#).unwrap();
        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.catalog_host, "json.example.com");
    }
}
