//! Per-call notification options

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Selects which registered notifiers receive a notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotifierSelector {
    /// A single notifier by name
    One(String),
    /// Several notifiers by name
    Many(Vec<String>),
}

impl NotifierSelector {
    /// The selected names in the order given
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name.clone()],
            Self::Many(names) => names.clone(),
        }
    }
}

impl From<&str> for NotifierSelector {
    fn from(name: &str) -> Self {
        Self::One(name.to_string())
    }
}

impl From<String> for NotifierSelector {
    fn from(name: String) -> Self {
        Self::One(name)
    }
}

impl From<Vec<String>> for NotifierSelector {
    fn from(names: Vec<String>) -> Self {
        Self::Many(names)
    }
}

impl From<Vec<&str>> for NotifierSelector {
    fn from(names: Vec<&str>) -> Self {
        Self::Many(names.into_iter().map(String::from).collect())
    }
}

/// Options accompanying an exception through the pipeline
///
/// Each notifier receives its own copy, so changes a notifier makes are
/// invisible to its siblings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotifyOptions {
    /// Explicit notifier selection; all registered notifiers when `None`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifiers: Option<NotifierSelector>,

    /// Extra type names to ignore for this call only
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ignore_exceptions: Vec<String>,

    /// Occurrences of this exception's group inside the grouping period,
    /// set when error grouping is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accumulated_errors_count: Option<u64>,

    /// Opaque context (request environment, user data) passed to notifiers
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

impl NotifyOptions {
    /// Empty options
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict delivery to the given notifiers
    pub fn with_notifiers(mut self, selector: impl Into<NotifierSelector>) -> Self {
        self.notifiers = Some(selector.into());
        self
    }

    /// Ignore the given type names for this call
    pub fn with_ignore_exceptions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_exceptions = names.into_iter().map(Into::into).collect();
        self
    }

    /// Attach a context value
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}
