//! Configuration management for SKI services

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;

/// Default upper bound for a single payload segment (10 MiB)
pub const DEFAULT_MAX_SEGMENT_SIZE: usize = 10 * 1024 * 1024;

/// Default number of key generation attempts before giving up on collisions
pub const DEFAULT_KEYGEN_MAX_ATTEMPTS: u32 = 8;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// SKI configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SkiConfig {
    /// Base directory for file-backed key vaults
    pub key_dir: PathBuf,
    /// Provider invocation used when none is given explicitly
    pub default_provider: String,
    /// Maximum number of bytes carried by one payload segment
    pub max_segment_size: usize,
    /// Bound on key generation retries after a KeyID collision
    pub keygen_max_attempts: u32,
    pub log_level: String,
    /// Emit JSON logs instead of human-readable ones
    pub log_json: bool,
}

impl Default for SkiConfig {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("./keys"),
            default_provider: "fs".to_string(),
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            keygen_max_attempts: DEFAULT_KEYGEN_MAX_ATTEMPTS,
            log_level: "info".to_string(),
            log_json: false,
        }
    }
}

impl SkiConfig {
    /// Load configuration from `SKI_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();
        Self::load(None)
    }

    /// Load configuration from an explicit set of `SKI_*` variables instead of
    /// the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::load(Some(vars))
    }

    fn load(vars: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let settings = config::Config::builder()
            .set_default("key_dir", defaults.key_dir.to_string_lossy().to_string())?
            .set_default("default_provider", defaults.default_provider)?
            .set_default("max_segment_size", defaults.max_segment_size as u64)?
            .set_default("keygen_max_attempts", defaults.keygen_max_attempts as u64)?
            .set_default("log_level", defaults.log_level)?
            .set_default("log_json", defaults.log_json)?
            .add_source(
                config::Environment::with_prefix("SKI")
                    .try_parsing(true)
                    .source(vars),
            )
            .build()?;

        let config: SkiConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_segment_size == 0 {
            return Err(ConfigError::Invalid {
                field: "max_segment_size",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.keygen_max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "keygen_max_attempts",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.default_provider.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "default_provider",
                reason: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        if self.log_level.is_empty() {
            "info"
        } else {
            &self.log_level
        }
    }
}
