//! Configuration management for Tripwire

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable prefix, e.g. `TRIPWIRE__GROUPING__ENABLED=true`
pub const ENV_PREFIX: &str = "TRIPWIRE";

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Error grouping configuration
    pub grouping: GroupingConfig,

    /// Ignore rules
    pub ignore: IgnoreConfig,

    /// Counter store configuration
    pub store: StoreConfig,

    /// Register the baseline `log` notifier at startup
    pub baseline_notifier: bool,

    /// Notifiers built at startup, keyed by notifier name
    pub notifiers: BTreeMap<String, serde_json::Value>,

    /// Propagate ignore-condition and notifier failures instead of logging them
    pub testing_mode: bool,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            grouping: GroupingConfig::default(),
            ignore: IgnoreConfig::default(),
            store: StoreConfig::default(),
            baseline_notifier: true,
            notifiers: BTreeMap::new(),
            testing_mode: false,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file and `TRIPWIRE__*` environment variables
    ///
    /// Environment variables override file values; anything unset keeps its default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.grouping.enabled && self.grouping.period.is_zero() {
            return Err(Error::config("grouping.period must be greater than zero"));
        }

        for pattern in &self.ignore.message_patterns {
            regex::Regex::new(pattern).map_err(|e| {
                Error::config(format!("invalid ignore.message_patterns entry '{pattern}': {e}"))
            })?;
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(Error::config(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

/// Error grouping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    /// Group repeated errors and throttle their notifications
    pub enabled: bool,
    /// How long a group stays alive without new occurrences
    #[serde(with = "humantime_serde")]
    pub period: Duration,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            period: Duration::from_secs(5 * 60),
        }
    }
}

/// Ignore rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Exception type names that never notify
    pub exceptions: Vec<String>,
    /// Regular expressions; an exception whose message matches any of them never notifies
    pub message_patterns: Vec<String>,
}

impl Default for IgnoreConfig {
    fn default() -> Self {
        Self {
            exceptions: default_ignored_exceptions(),
            message_patterns: Vec::new(),
        }
    }
}

/// "Not found" and routing errors that rarely deserve a notification
pub fn default_ignored_exceptions() -> Vec<String> {
    [
        "RecordNotFound",
        "DocumentNotFound",
        "ActionNotFound",
        "RoutingError",
        "UnknownFormat",
        "UrlGenerationError",
        "InvalidMimeType",
        "InvalidParameterError",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Which counter store backs error grouping
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process store, counts are per process
    #[default]
    Memory,
    /// Redis, counts are shared between processes
    Redis,
}

/// Counter store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Store backend
    pub backend: StoreBackend,
    /// Redis settings, used when `backend = "redis"`
    pub redis: RedisConfig,
}

/// Redis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Redis URL
    pub url: String,
    /// Prefix prepended to every counter key
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: "tripwire".to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: String,
    /// Log format (json or pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(!config.grouping.enabled);
        assert_eq!(config.grouping.period, Duration::from_secs(300));
        assert!(config.baseline_notifier);
        assert!(!config.testing_mode);
        assert!(config
            .ignore
            .exceptions
            .contains(&"RoutingError".to_string()));
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
testing_mode = true

[grouping]
enabled = true
period = "10m"

[ignore]
exceptions = ["Timeout"]
message_patterns = ["^health check"]

[notifiers.webhook]
url = "http://localhost:9000/hooks"
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert!(config.testing_mode);
        assert!(config.grouping.enabled);
        assert_eq!(config.grouping.period, Duration::from_secs(600));
        assert_eq!(config.ignore.exceptions, vec!["Timeout".to_string()]);
        assert_eq!(config.ignore.message_patterns, vec!["^health check".to_string()]);
        assert_eq!(
            config.notifiers["webhook"]["url"],
            serde_json::json!("http://localhost:9000/hooks")
        );
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
baseline_notifier = true

[store.redis]
key_prefix = "from-file"
"#
        )
        .unwrap();

        // Only this test sets these variables
        std::env::set_var("TRIPWIRE__STORE__REDIS__KEY_PREFIX", "from-env");
        std::env::set_var("TRIPWIRE__BASELINE_NOTIFIER", "false");
        let loaded = Config::load(Some(file.path()));
        std::env::remove_var("TRIPWIRE__STORE__REDIS__KEY_PREFIX");
        std::env::remove_var("TRIPWIRE__BASELINE_NOTIFIER");

        let config = loaded.unwrap();
        assert_eq!(config.store.redis.key_prefix, "from-env");
        assert!(!config.baseline_notifier);
        assert_eq!(config.store.redis.url, "redis://localhost:6379");
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut config = Config::default();
        config.ignore.message_patterns.push("(unclosed".to_string());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_period_rejected_when_enabled() {
        let mut config = Config::default();
        config.grouping.period = Duration::ZERO;
        assert!(config.validate().is_ok());

        config.grouping.enabled = true;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
