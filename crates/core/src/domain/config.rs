//! Configuration management for the LoFi generator
//!
//! This module provides:
//! - Configuration structs for the app, the output device and the engine
//! - User preset storage with TOML serialization
//! - The config file manager with factory defaults and corrupt-file backup

use crate::domain::params::EffectParameters;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration operations
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Preset not found: {0}")]
    PresetNotFound(String),
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Product name used as the export file prefix
    pub product_name: String,

    /// Directory exports are written to
    pub export_dir: PathBuf,

    /// User preset directory
    pub preset_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            product_name: "track".to_string(),
            export_dir: PathBuf::from("."),
            preset_dir: PathBuf::from("presets"),
        }
    }
}

/// Audio device configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioDeviceConfig {
    /// Output device name (empty = use default)
    pub output_device: String,

    /// Requested device buffer size in frames (0 = device default)
    pub buffer_size: u32,
}

/// Amplitude the crackle source plays at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrackleLaw {
    /// Full amplitude whenever crackle is on
    #[default]
    Binary,
    /// Amplitude follows the crackle percentage
    Linear,
}

impl CrackleLaw {
    pub fn amplitude(&self, crackle_percent: f32) -> f32 {
        match self {
            CrackleLaw::Binary => 1.0,
            CrackleLaw::Linear => crackle_percent / 100.0,
        }
    }
}

/// Signal chain and render settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Frames per processing block
    pub block_frames: usize,

    /// Seed for the reverb impulse and crackle noise
    pub reverb_seed: u32,

    /// Channel count of exported files
    pub export_channels: usize,

    /// Crackle amplitude law
    pub crackle_law: CrackleLaw,

    /// Master volume at startup, 0..100
    pub default_volume: f32,
}

impl EngineConfig {
    pub const DEFAULT_BLOCK_FRAMES: usize = 1024;
    pub const DEFAULT_SEED: u32 = 0x4C4F_4649;
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_frames: Self::DEFAULT_BLOCK_FRAMES,
            reverb_seed: Self::DEFAULT_SEED,
            export_channels: 2,
            crackle_law: CrackleLaw::Binary,
            default_volume: 80.0,
        }
    }
}

/// Complete LoFi generator configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LofiConfig {
    pub app: AppConfig,
    pub audio: AudioDeviceConfig,
    pub engine: EngineConfig,
    pub effects: EffectParameters,
}

impl LofiConfig {
    /// Load configuration from TOML file
    #[instrument(skip(path))]
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let contents = fs::read_to_string(path).await?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("Configuration loaded successfully");
        Ok(config)
    }

    /// Save configuration to TOML file
    #[instrument(skip(self, path))]
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        info!(path = %path.display(), "Saving configuration");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let toml_str = toml::to_string_pretty(self)?;
        fs::write(path, toml_str).await?;

        debug!("Configuration saved successfully");
        Ok(())
    }

    /// Create factory default configuration
    pub fn factory_default() -> Self {
        Self::default()
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.engine.block_frames == 0 {
            return Err(ConfigError::Invalid(
                "engine.block_frames must be positive".to_string(),
            ));
        }
        if self.engine.export_channels == 0 {
            return Err(ConfigError::Invalid(
                "engine.export_channels must be positive".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.engine.default_volume) {
            return Err(ConfigError::Invalid(format!(
                "engine.default_volume {} is outside 0..100",
                self.engine.default_volume
            )));
        }
        Ok(())
    }
}

fn check_preset_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "preset name '{}' may only contain letters, digits, '-' and '_'",
            name
        )))
    }
}

/// User preset manager
///
/// Each preset is one TOML file holding an [`EffectParameters`] table.
pub struct PresetManager {
    preset_dir: PathBuf,
}

impl PresetManager {
    /// Create a new preset manager
    pub fn new(preset_dir: PathBuf) -> Self {
        Self { preset_dir }
    }

    fn preset_path(&self, name: &str) -> Result<PathBuf> {
        check_preset_name(name)?;
        Ok(self.preset_dir.join(format!("{}.toml", name)))
    }

    /// List all available presets
    #[instrument(skip(self))]
    pub async fn list_presets(&self) -> Result<Vec<String>> {
        let mut presets = Vec::new();

        if !self.preset_dir.exists() {
            return Ok(presets);
        }

        let mut entries = fs::read_dir(&self.preset_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().map(|e| e == "toml").unwrap_or(false) {
                if let Some(name) = path.file_stem().and_then(|n| n.to_str()) {
                    presets.push(name.to_string());
                }
            }
        }

        presets.sort();
        debug!(count = presets.len(), "Listed presets");
        Ok(presets)
    }

    /// Load a preset by name
    #[instrument(skip(self))]
    pub async fn load_preset(&self, name: &str) -> Result<EffectParameters> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        let contents = fs::read_to_string(&path).await?;
        let params: EffectParameters = toml::from_str(&contents)?;
        Ok(params.sanitized())
    }

    /// Save a preset by name
    #[instrument(skip(self, params))]
    pub async fn save_preset(&self, name: &str, params: &EffectParameters) -> Result<()> {
        let path = self.preset_path(name)?;
        fs::create_dir_all(&self.preset_dir).await?;

        let toml_str = toml::to_string_pretty(&params.sanitized())?;
        fs::write(&path, toml_str).await?;
        info!(name, "Preset saved");
        Ok(())
    }

    /// Delete a preset by name
    #[instrument(skip(self))]
    pub async fn delete_preset(&self, name: &str) -> Result<()> {
        let path = self.preset_path(name)?;

        if !path.exists() {
            return Err(ConfigError::PresetNotFound(name.to_string()));
        }

        fs::remove_file(&path).await?;
        info!(name, "Preset deleted");
        Ok(())
    }

    /// Check if a preset exists
    pub async fn preset_exists(&self, name: &str) -> bool {
        self.preset_path(name).map(|p| p.exists()).unwrap_or(false)
    }
}

/// Configuration manager for the main config file
///
/// Manages `config.toml` inside the configuration directory, by default
/// `~/.config/lofi`.
pub struct ConfigManager {
    config_dir: PathBuf,
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(config_dir: PathBuf) -> Self {
        let config_path = config_dir.join("config.toml");
        Self {
            config_dir,
            config_path,
        }
    }

    /// Get the default config directory path
    ///
    /// Returns `~/.config/lofi` on Linux, the platform equivalent elsewhere.
    pub fn default_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|p| p.join("lofi"))
            .ok_or_else(|| ConfigError::Invalid("Could not determine config directory".to_string()))
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Get the config file path
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load configuration from file
    ///
    /// If the config file doesn't exist, saves and returns the factory default.
    /// If the config file is corrupt, backs it up and returns the factory default.
    #[instrument(skip(self))]
    pub async fn load(&self) -> LofiConfig {
        if !self.config_path.exists() {
            info!(
                path = %self.config_path.display(),
                "Config file not found, creating factory default"
            );

            let config = LofiConfig::factory_default();

            if let Err(e) = config.save_to_file(&self.config_path).await {
                warn!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to save factory default config"
                );
            }

            return config;
        }

        match LofiConfig::load_from_file(&self.config_path).await {
            Ok(config) => {
                info!(
                    path = %self.config_path.display(),
                    "Configuration loaded successfully"
                );
                config
            }
            Err(e) => {
                error!(
                    path = %self.config_path.display(),
                    error = %e,
                    "Failed to load config, using factory default"
                );

                let backup_path = self.config_path.with_extension("toml.corrupt");
                if let Err(copy_err) = fs::copy(&self.config_path, &backup_path).await {
                    error!(
                        path = %backup_path.display(),
                        error = %copy_err,
                        "Failed to backup corrupt config"
                    );
                }

                LofiConfig::factory_default()
            }
        }
    }

    /// Save configuration to file
    #[instrument(skip(self, config))]
    pub async fn save(&self, config: &LofiConfig) -> Result<()> {
        config.validate()?;
        fs::create_dir_all(&self.config_dir).await?;
        config.save_to_file(&self.config_path).await
    }

    /// Clear configuration (delete config file)
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        if self.config_path.exists() {
            fs::remove_file(&self.config_path).await?;
            info!(
                path = %self.config_path.display(),
                "Configuration cleared"
            );
        }

        Ok(())
    }

    /// Check if config file exists
    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }
}
