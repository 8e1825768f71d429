//! Configuration model.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration structure for vigil.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Queue broker configuration
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Per-class capacity ceilings
    #[serde(default)]
    pub capacity: CapacityConfig,

    /// Reconciler tuning
    #[serde(default)]
    pub reconciler: ReconcilerConfig,

    /// Config-seeded variables for the static resolver, keyed by project scope
    #[serde(default)]
    pub variables: HashMap<String, Vec<VariableSpec>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            logging: LoggingConfig::default(),
            broker: BrokerConfig::default(),
            capacity: CapacityConfig::default(),
            reconciler: ReconcilerConfig::default(),
            variables: HashMap::new(),
        }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".vigil/vigil.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Queue broker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BrokerConfig {
    /// Base URL of the queue daemon's HTTP API
    #[serde(default = "default_broker_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_broker_url() -> String {
    "http://127.0.0.1:6380".to_string()
}

const fn default_request_timeout_ms() -> u64 {
    5_000
}

impl BrokerConfig {
    /// Request timeout as a `Duration`.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: default_broker_url(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Capacity ceilings per queue class.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CapacityConfig {
    /// Ceiling applied to classes without an explicit entry
    #[serde(default = "default_ceiling")]
    pub default_ceiling: u64,

    /// Per-class overrides, keyed by the class string form
    #[serde(default)]
    pub per_class: HashMap<String, u64>,
}

const fn default_ceiling() -> u64 {
    64
}

impl CapacityConfig {
    /// Ceiling for a class string.
    pub fn ceiling_for(&self, class: &str) -> u64 {
        self.per_class.get(class).copied().unwrap_or(self.default_ceiling)
    }
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            default_ceiling: default_ceiling(),
            per_class: HashMap::new(),
        }
    }
}

/// Reconciler tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReconcilerConfig {
    /// Seconds between passes when running as a loop
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Overall deadline for one run's probe fan-out, in milliseconds
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Maximum execution window before an unconfirmed run is declared lost
    #[serde(default = "default_max_execution_secs")]
    pub max_execution_secs: u64,

    /// Per-class execution window overrides, keyed by the class string form
    #[serde(default)]
    pub class_overrides: HashMap<String, u64>,

    /// Concurrent per-run audits in one pass
    #[serde(default = "default_audit_concurrency")]
    pub audit_concurrency: usize,
}

const fn default_interval_secs() -> u64 {
    300
}

const fn default_probe_timeout_ms() -> u64 {
    3_000
}

// Platform execution ceiling: 60 minutes.
const fn default_max_execution_secs() -> u64 {
    3_600
}

const fn default_audit_concurrency() -> usize {
    16
}

impl ReconcilerConfig {
    /// Probe deadline as a `Duration`.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Execution window for a queue class, honoring overrides.
    pub fn execution_window_for(&self, class: &str) -> chrono::Duration {
        let secs = self
            .class_overrides
            .get(class)
            .copied()
            .unwrap_or(self.max_execution_secs);
        chrono::Duration::seconds(secs as i64)
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            probe_timeout_ms: default_probe_timeout_ms(),
            max_execution_secs: default_max_execution_secs(),
            class_overrides: HashMap::new(),
            audit_concurrency: default_audit_concurrency(),
        }
    }
}

/// One config-seeded variable for the static resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VariableSpec {
    /// Placeholder name as written in script bodies
    pub name: String,
    /// Plain value substituted at dispatch
    pub value: String,
    /// Secrets are substituted but never logged
    #[serde(default)]
    pub secret: bool,
}
