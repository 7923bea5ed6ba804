//! Configuration loading and environment variable handling

use crate::domains::logging::{LogFormat, LogLevel};
use crate::domains::SurgeConfig;
use crate::error::{ConfigError, ConfigResult};
use std::path::Path;
use std::str::FromStr;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "SURGE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML or JSON file with environment overrides.
    ///
    /// The format is chosen by extension: `.json` is parsed as JSON, `.yaml`
    /// and `.yml` as YAML.
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<SurgeConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let mut config: SurgeConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            other => {
                return Err(ConfigError::UnsupportedFormat(
                    other.unwrap_or_default().to_string(),
                ))
            }
        };

        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;

        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env(&self) -> ConfigResult<SurgeConfig> {
        let mut config = SurgeConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration with fallback chain
    pub fn load(&self, config_path: Option<impl AsRef<Path>>) -> ConfigResult<SurgeConfig> {
        match config_path {
            Some(path) => self.from_file(path),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut SurgeConfig) -> ConfigResult<()> {
        let coordinator = &mut config.coordinator;

        if let Ok(level) = self.get_env_var("LOG_LEVEL") {
            coordinator.logging.level = LogLevel::from_str(&level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            coordinator.logging.format = LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        if let Ok(url) = self.get_env_var("PROMETHEUS_URL") {
            coordinator.monitor.prometheus_url = url;
        }

        if let Ok(max_users) = self.get_env_var("MAX_ACTIVE_USERS") {
            coordinator.cluster.max_active_users = max_users
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid MAX_ACTIVE_USERS: {}", e)))?;
        }

        if let Ok(rest_time) = self.get_env_var("REST_TIME") {
            let seconds: u64 = rest_time
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid REST_TIME: {}", e)))?;
            coordinator.rest_time = std::time::Duration::from_secs(seconds);
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
