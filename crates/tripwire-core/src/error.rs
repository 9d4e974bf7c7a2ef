//! Error types for Tripwire

use thiserror::Error;

use crate::alerting::NotifierError;
use crate::db::StoreError;

/// Result type alias using Tripwire's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error returned by user-supplied callables (ignore conditions, custom notifiers)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error types for Tripwire operations
#[derive(Error, Debug)]
pub enum Error {
    /// A notifier was registered from configuration but no constructor exists for its name
    #[error("No notifier named '{name}' was found. Please revise your configuration options")]
    UndefinedNotifier {
        /// Requested notifier name
        name: String,
    },

    /// A registration call was made with an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A notifier constructor rejected its configuration
    #[error("Notifier '{name}' could not be built: {message}")]
    NotifierConfig {
        /// Notifier name
        name: String,
        /// Constructor's complaint
        message: String,
    },

    /// An ignore condition failed while being evaluated
    #[error("An error occurred when evaluating an ignore condition: {0}")]
    IgnoreCondition(#[source] BoxError),

    /// A notifier failed while sending
    #[error("An error occurred when sending a notification using '{name}' notifier: {source}")]
    Notifier {
        /// Notifier name
        name: String,
        /// What the notifier reported
        #[source]
        source: NotifierError,
    },

    /// A notifier was selected for dispatch but is not registered
    #[error("Notifier '{0}' is not registered")]
    NotRegistered(String),

    /// Counter store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Create an undefined notifier error
    pub fn undefined_notifier(name: impl Into<String>) -> Self {
        Self::UndefinedNotifier { name: name.into() }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a notifier configuration error
    pub fn notifier_config(name: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::NotifierConfig {
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undefined_notifier_is_distinct() {
        let err = Error::undefined_notifier("carrier_pigeon");
        assert!(matches!(err, Error::UndefinedNotifier { .. }));
        assert!(err.to_string().contains("carrier_pigeon"));
    }

    #[test]
    fn test_notifier_error_keeps_source() {
        let err = Error::Notifier {
            name: "webhook".to_string(),
            source: NotifierError::HttpError("503".to_string()),
        };
        assert!(err.to_string().contains("webhook"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
