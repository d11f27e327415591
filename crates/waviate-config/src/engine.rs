//! Engine settings file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, write_with_parents};

/// Stream and logging settings shared by every patch a host runs.
///
/// # TOML Format
///
/// ```toml
/// sample_rate = 48000
/// block_size = 512
/// log_filter = "warn"
/// seed = 0
/// ```
///
/// Missing keys take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Stream sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per block.
    pub block_size: usize,
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub log_filter: String,
    /// Seed for the host noise generator.
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 512,
            log_filter: "warn".to_string(),
            seed: 0,
        }
    }
}

impl EngineConfig {
    /// Load settings from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Load settings, falling back to defaults when the file does not exist.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and check settings from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save settings to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        write_with_parents(path.as_ref(), &self.to_toml()?)
    }

    /// Convert settings to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Rejects a zero sample rate or block size.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "sample_rate",
                reason: "must be positive".to_string(),
            });
        }
        if self.block_size == 0 {
            return Err(ConfigError::InvalidSetting {
                key: "block_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Sample rate as the engine's decimal type.
    pub fn sample_rate_hz(&self) -> f64 {
        f64::from(self.sample_rate)
    }
}
