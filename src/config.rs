use crate::defaults;
use crate::error::{Result, VoxlinkError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub audio: AudioConfig,
    pub generation: GenerationConfig,
}

/// Server connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub deployment_id: Option<String>,
    pub region: String,
    pub api_key: Option<String>,
}

/// Audio device configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AudioConfig {
    pub input_device: Option<String>,
}

/// Sampling knobs forwarded to the server at connection time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    pub audio_topk: u32,
    pub audio_temperature: f32,
    pub text_topk: u32,
    pub text_temperature: f32,
    pub audio_seed: Option<u64>,
    pub text_seed: Option<u64>,
    pub repetition_penalty: Option<f32>,
    pub repetition_penalty_context: Option<u32>,
    pub pad_mult: Option<f32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            deployment_id: None,
            region: defaults::DEFAULT_REGION.to_string(),
            api_key: None,
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            audio_topk: defaults::AUDIO_TOPK,
            audio_temperature: defaults::AUDIO_TEMPERATURE,
            text_topk: defaults::TEXT_TOPK,
            text_temperature: defaults::TEXT_TEMPERATURE,
            audio_seed: None,
            text_seed: None,
            repetition_penalty: None,
            repetition_penalty_context: None,
            pad_mult: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file, or return defaults if the file does
    /// not exist. Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(VoxlinkError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(e) => Err(VoxlinkError::ConfigParse {
                message: format!("{}: {}", path.display(), e),
            }),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXLINK_DEPLOYMENT_ID → connection.deployment_id
    /// - VOXLINK_API_KEY → connection.api_key
    /// - VOXLINK_REGION → connection.region
    /// - VOXLINK_AUDIO_DEVICE → audio.input_device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(id) = std::env::var("VOXLINK_DEPLOYMENT_ID")
            && !id.is_empty()
        {
            self.connection.deployment_id = Some(id);
        }

        if let Ok(key) = std::env::var("VOXLINK_API_KEY")
            && !key.is_empty()
        {
            self.connection.api_key = Some(key);
        }

        if let Ok(region) = std::env::var("VOXLINK_REGION")
            && !region.is_empty()
        {
            self.connection.region = region;
        }

        if let Ok(device) = std::env::var("VOXLINK_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.input_device = Some(device);
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxlink/config.toml on Linux
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("voxlink").join("config.toml"))
    }
}
