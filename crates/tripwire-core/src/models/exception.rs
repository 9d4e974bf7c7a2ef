//! Captured exception data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An exception captured at the request boundary
///
/// Records are immutable once captured; every decision in the pipeline
/// reads from them without modification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    /// Fully-qualified type name (e.g. `ActionController::RoutingError`)
    pub type_name: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,

    /// Backtrace frames, innermost first
    #[serde(default)]
    pub backtrace: Option<Vec<String>>,

    /// Identities of the type's ancestors, matched by the ignore list
    #[serde(default)]
    pub type_hierarchy: Vec<String>,

    /// When the exception was captured
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl ExceptionRecord {
    /// Capture a new exception without a backtrace
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            backtrace: None,
            type_hierarchy: Vec::new(),
            occurred_at: Utc::now(),
        }
    }

    /// Attach a backtrace
    pub fn with_backtrace<I, S>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.backtrace = Some(frames.into_iter().map(Into::into).collect());
        self
    }

    /// Attach ancestor type identities
    pub fn with_type_hierarchy<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.type_hierarchy = ancestors.into_iter().map(Into::into).collect();
        self
    }

    /// Capture a Rust error, using its `Display` output as the message
    ///
    /// The source chain is recorded as backtrace-style frames so that errors
    /// raised from the same place group together.
    pub fn from_error<E>(type_name: impl Into<String>, err: &E) -> Self
    where
        E: std::error::Error + ?Sized,
    {
        let mut frames = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            frames.push(cause.to_string());
            source = cause.source();
        }

        let mut record = Self::new(type_name, err.to_string());
        if !frames.is_empty() {
            record.backtrace = Some(frames);
        }
        record
    }

    /// The first backtrace frame, or an empty string when there is none
    pub fn first_frame(&self) -> &str {
        self.backtrace
            .as_ref()
            .and_then(|frames| frames.first())
            .map_or("", String::as_str)
    }

    /// Iterate over the type name followed by every ancestor identity
    pub fn type_identities(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.type_name.as_str()).chain(self.type_hierarchy.iter().map(String::as_str))
    }
}
