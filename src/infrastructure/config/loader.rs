//! Configuration loading with hierarchical merging.

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Broker base_url cannot be empty")]
    EmptyBrokerUrl,

    #[error("Invalid capacity ceiling for {class}: must be at least 1")]
    InvalidCeiling { class: String },

    #[error("Invalid reconciler setting: {0}")]
    InvalidReconciler(String),
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging.
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .vigil/config.yaml (project config, created by init)
    /// 3. .vigil/local.yaml (project local overrides, optional)
    /// 4. Environment variables (VIGIL_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".vigil/config.yaml"))
            .merge(Yaml::file(".vigil/local.yaml"))
            .merge(Env::prefixed("VIGIL_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }
        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        if config.broker.base_url.is_empty() {
            return Err(ConfigError::EmptyBrokerUrl);
        }

        if config.capacity.default_ceiling == 0 {
            return Err(ConfigError::InvalidCeiling {
                class: "(default)".to_string(),
            });
        }
        for (class, ceiling) in &config.capacity.per_class {
            if *ceiling == 0 {
                return Err(ConfigError::InvalidCeiling {
                    class: class.clone(),
                });
            }
        }

        if config.reconciler.probe_timeout_ms == 0 {
            return Err(ConfigError::InvalidReconciler(
                "probe_timeout_ms must be positive".to_string(),
            ));
        }
        if config.reconciler.max_execution_secs == 0 {
            return Err(ConfigError::InvalidReconciler(
                "max_execution_secs must be positive".to_string(),
            ));
        }
        if config.reconciler.interval_secs == 0 {
            return Err(ConfigError::InvalidReconciler(
                "interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
