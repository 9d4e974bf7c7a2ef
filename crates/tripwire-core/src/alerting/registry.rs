//! Named notifiers and the constructors that build them from configuration

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::notifier::{LogNotifier, Notifier, NotifierError, WebhookNotifier};
use crate::error::{Error, Result};

/// Name of the notifier registered by default
pub const BASELINE_NOTIFIER: &str = "log";

/// Builds a notifier from its configuration object
pub type NotifierConstructor =
    Arc<dyn Fn(&Value) -> std::result::Result<Arc<dyn Notifier>, NotifierError> + Send + Sync>;

/// What to register under a name
pub enum NotifierSpec {
    /// A ready notifier
    Instance(Arc<dyn Notifier>),
    /// Configuration handed to the constructor registered under the same name
    Config(Value),
}

impl NotifierSpec {
    /// Register a ready notifier
    pub fn instance<N: Notifier + 'static>(notifier: N) -> Self {
        Self::Instance(Arc::new(notifier))
    }

    /// Register through the constructor table
    pub fn config(config: Value) -> Self {
        Self::Config(config)
    }
}

impl fmt::Debug for NotifierSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Instance(_) => f.write_str("Instance(..)"),
            Self::Config(config) => f.debug_tuple("Config").field(config).finish(),
        }
    }
}

/// Registry of named notifiers
///
/// Iteration follows registration order; re-registering an existing name
/// replaces the notifier in place. Reads hand out snapshots so that
/// registration during a dispatch never blocks or disturbs it.
pub struct NotifierRegistry {
    notifiers: RwLock<Vec<(String, Arc<dyn Notifier>)>>,
    constructors: RwLock<HashMap<String, NotifierConstructor>>,
}

impl NotifierRegistry {
    /// A registry with the built-in constructors and no notifiers
    pub fn empty() -> Self {
        let registry = Self {
            notifiers: RwLock::new(Vec::new()),
            constructors: RwLock::new(HashMap::new()),
        };

        registry.register_constructor("log", |config| {
            Ok(Arc::new(LogNotifier::from_config(config)?) as Arc<dyn Notifier>)
        });
        registry.register_constructor("webhook", |config| {
            Ok(Arc::new(WebhookNotifier::from_config(config)?) as Arc<dyn Notifier>)
        });

        registry
    }

    /// Add or replace the constructor used for notifiers registered as `name`
    pub fn register_constructor<F>(&self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&Value) -> std::result::Result<Arc<dyn Notifier>, NotifierError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors
            .write()
            .insert(name.into(), Arc::new(constructor));
    }

    /// Register a notifier under `name`
    ///
    /// With [`NotifierSpec::Config`] the notifier is built by the constructor
    /// registered under the same name. An unknown name fails with
    /// [`Error::UndefinedNotifier`]; a configuration that is not an object
    /// fails with [`Error::InvalidArgument`].
    pub fn register(&self, name: impl Into<String>, spec: NotifierSpec) -> Result<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(Error::invalid_argument("notifier name must not be empty"));
        }

        let notifier = match spec {
            NotifierSpec::Instance(notifier) => notifier,
            NotifierSpec::Config(config) => self.construct(&name, &config)?,
        };

        let mut notifiers = self.notifiers.write();
        match notifiers.iter_mut().find(|(existing, _)| *existing == name) {
            Some(entry) => entry.1 = notifier,
            None => notifiers.push((name.clone(), notifier)),
        }

        info!(notifier = %name, "Notifier registered");
        Ok(())
    }

    /// Register a ready notifier under `name`
    pub fn register_notifier<N: Notifier + 'static>(
        &self,
        name: impl Into<String>,
        notifier: N,
    ) -> Result<()> {
        self.register(name, NotifierSpec::instance(notifier))
    }

    fn construct(&self, name: &str, config: &Value) -> Result<Arc<dyn Notifier>> {
        let config = match config {
            Value::Object(_) => config.clone(),
            Value::Null => Value::Object(serde_json::Map::new()),
            other => {
                return Err(Error::invalid_argument(format!(
                    "Invalid notifier '{name}' defined as {other}"
                )))
            }
        };

        let constructor = self
            .constructors
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::undefined_notifier(name))?;

        debug!(notifier = %name, "Building notifier from configuration");
        constructor(&config).map_err(|e| Error::notifier_config(name, e.to_string()))
    }

    /// Remove the notifier registered under `name`
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Notifier>> {
        let mut notifiers = self.notifiers.write();
        let position = notifiers.iter().position(|(existing, _)| existing == name)?;
        let (_, notifier) = notifiers.remove(position);
        info!(notifier = %name, "Notifier unregistered");
        Some(notifier)
    }

    /// The notifier registered under `name`
    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Notifier>> {
        self.notifiers
            .read()
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, notifier)| Arc::clone(notifier))
    }

    /// Registered names in registration order
    pub fn list_names(&self) -> Vec<String> {
        self.notifiers
            .read()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.notifiers.read().iter().any(|(existing, _)| existing == name)
    }

    /// Copy of the current entries
    pub fn snapshot(&self) -> Vec<(String, Arc<dyn Notifier>)> {
        self.notifiers.read().clone()
    }

    /// Remove every notifier; constructors are kept
    pub fn clear(&self) {
        self.notifiers.write().clear();
    }

    /// Restore the baseline notifier set
    pub fn reset(&self) {
        let mut notifiers = self.notifiers.write();
        notifiers.clear();
        notifiers.push((BASELINE_NOTIFIER.to_string(), Arc::new(LogNotifier::new())));
    }

    /// Number of registered notifiers
    pub fn len(&self) -> usize {
        self.notifiers.read().len()
    }

    /// Whether no notifier is registered
    pub fn is_empty(&self) -> bool {
        self.notifiers.read().is_empty()
    }
}

impl Default for NotifierRegistry {
    /// A registry with the baseline `log` notifier
    fn default() -> Self {
        let registry = Self::empty();
        registry.reset();
        registry
    }
}

impl fmt::Debug for NotifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierRegistry")
            .field("notifiers", &self.list_names())
            .finish_non_exhaustive()
    }
}
