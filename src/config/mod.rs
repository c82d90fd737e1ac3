use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const APP_DIR: &str = "mixdeck";

/// Player configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub default_volume: f32,
    pub default_mixer_volume: f32,
    pub preferred_device: Option<String>,
    /// Largest block, in frames, the engine renders in one pass
    pub block_size: usize,
    pub jump_seconds: f64,
    pub session_file: PathBuf,
    pub restore_session: bool,
    /// Program asked for artist/title when a file carries no usable artist tag
    pub tag_probe_program: String,
    /// Waveform peaks per second of audio
    pub waveform_resolution: u32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: 0.8,
            default_mixer_volume: 0.8,
            preferred_device: None,
            block_size: 512,
            jump_seconds: 5.0,
            session_file: app_dir().join("session.toml"),
            restore_session: true,
            tag_probe_program: "ffprobe".to_string(),
            waveform_resolution: 50,
        }
    }
}

impl PlayerConfig {
    /// Pull out-of-range values back to something usable
    pub fn sanitized(mut self) -> Self {
        let defaults = Self::default();
        self.default_volume = clamp_unit(self.default_volume, defaults.default_volume);
        self.default_mixer_volume = clamp_unit(self.default_mixer_volume, defaults.default_mixer_volume);
        if self.block_size == 0 {
            self.block_size = defaults.block_size;
        }
        if !self.jump_seconds.is_finite() || self.jump_seconds <= 0.0 {
            self.jump_seconds = defaults.jump_seconds;
        }
        if self.waveform_resolution == 0 {
            self.waveform_resolution = defaults.waveform_resolution;
        }
        self
    }
}

fn clamp_unit(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join(APP_DIR)
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: PlayerConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Ok(Self::with_path(config_path))
    }

    /// Manager backed by an explicit file; a missing or unreadable file yields defaults
    pub fn with_path(config_path: PathBuf) -> Self {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("Ignoring config file {}: {}", config_path.display(), e);
                PlayerConfig::default()
            }
        };

        Self {
            config: config.sanitized(),
            config_path,
        }
    }

    pub fn get_config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut PlayerConfig),
    {
        updater(&mut self.config);
        self.config = self.config.clone().sanitized();
        self.save_config()
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.preferred_device = device;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = PlayerConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join(APP_DIR);

        std::fs::create_dir_all(&config_dir).map_err(ConfigError::IoError)?;

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<PlayerConfig, ConfigError> {
        if !path.exists() {
            return Ok(PlayerConfig::default());
        }

        let config_content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;

        let config: PlayerConfig = toml::from_str(&config_content).map_err(ConfigError::DeserializationError)?;

        Ok(config)
    }

    fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let config_content = toml::to_string_pretty(&self.config).map_err(ConfigError::SerializationError)?;

        std::fs::write(&self.config_path, config_content).map_err(ConfigError::IoError)?;

        Ok(())
    }
}
