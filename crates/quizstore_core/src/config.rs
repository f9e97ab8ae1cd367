//! Store configuration.
//!
//! # Responsibility
//! - Hold table naming and cache/outbox switches shared by repositories and
//!   migrators.
//! - Load overrides from a JSON document; every field falls back to defaults.

use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

const DEFAULT_TABLE_PREFIX: &str = "wp_";
const DEFAULT_NAMESPACE_PREFIX: &str = "money_quiz_";
const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
const DEFAULT_SLOW_QUERY_MS: u64 = 50;

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "invalid config document: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
        }
    }
}

/// Naming and behavior switches for one store instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Host-wide table prefix, e.g. `wp_`.
    pub table_prefix: String,
    /// Product prefix between the host prefix and the table name.
    /// Also the prefix of lifecycle event names.
    pub namespace_prefix: String,
    /// Ledger table name without prefixes.
    pub ledger_table: String,
    /// Key/value options table name without the host prefix.
    pub options_table: String,
    /// Outbox table name without prefixes.
    pub outbox_table: String,
    pub cache_enabled: bool,
    /// Cache entry lifetime. `None` keeps entries until invalidated.
    pub cache_ttl_secs: Option<u64>,
    /// Persist lifecycle events to the outbox in the mutation transaction.
    pub outbox_enabled: bool,
    /// Query timing table name without prefixes. Only the optimized schema
    /// profile creates it.
    pub performance_table: String,
    /// Time repository reads and batch writes.
    pub monitor_queries: bool,
    /// Monitored calls at or above this duration are logged as slow.
    pub slow_query_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table_prefix: DEFAULT_TABLE_PREFIX.to_string(),
            namespace_prefix: DEFAULT_NAMESPACE_PREFIX.to_string(),
            ledger_table: "migrations".to_string(),
            options_table: "options".to_string(),
            outbox_table: "event_outbox".to_string(),
            cache_enabled: true,
            cache_ttl_secs: Some(DEFAULT_CACHE_TTL_SECS),
            outbox_enabled: false,
            performance_table: "query_performance".to_string(),
            monitor_queries: false,
            slow_query_ms: DEFAULT_SLOW_QUERY_MS,
        }
    }
}

impl StoreConfig {
    /// Parses a JSON config document. Missing fields keep their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(ConfigError::Parse)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_json_str(&raw)
    }

    /// Full name of a product table: `<table_prefix><namespace_prefix><name>`.
    pub fn table(&self, name: &str) -> String {
        format!("{}{}{}", self.table_prefix, self.namespace_prefix, name)
    }

    /// Full name of a host-level table: `<table_prefix><name>`.
    pub fn global_table(&self, name: &str) -> String {
        format!("{}{}", self.table_prefix, name)
    }

    pub fn ledger_table_name(&self) -> String {
        self.table(&self.ledger_table)
    }

    pub fn options_table_name(&self) -> String {
        self.global_table(&self.options_table)
    }

    pub fn outbox_table_name(&self) -> String {
        self.table(&self.outbox_table)
    }

    pub fn performance_table_name(&self) -> String {
        self.table(&self.performance_table)
    }
}

#[cfg(test)]
mod tests {
    use super::StoreConfig;

    #[test]
    fn table_names_compose_both_prefixes() {
        let config = StoreConfig::default();
        assert_eq!(config.table("prospects"), "wp_money_quiz_prospects");
        assert_eq!(config.ledger_table_name(), "wp_money_quiz_migrations");
        assert_eq!(config.options_table_name(), "wp_options");
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config =
            StoreConfig::from_json_str(r#"{"table_prefix": "site2_", "cache_enabled": false}"#)
                .unwrap();
        assert_eq!(config.table_prefix, "site2_");
        assert!(!config.cache_enabled);
        assert_eq!(config.namespace_prefix, "money_quiz_");
        assert_eq!(config.cache_ttl_secs, Some(3600));
        assert!(!config.monitor_queries);
        assert_eq!(config.slow_query_ms, 50);
    }

    #[test]
    fn malformed_json_is_rejected() {
        let err = StoreConfig::from_json_str("{not json").unwrap_err();
        assert!(err.to_string().contains("invalid config document"));
    }
}
