//! Ignore rule evaluation

use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::ErrorMode;
use crate::error::{BoxError, Error, Result};
use crate::models::{ExceptionRecord, NotifyOptions};

/// A predicate deciding that an exception should never notify
pub type IgnoreCondition =
    Arc<dyn Fn(&ExceptionRecord, &NotifyOptions) -> std::result::Result<bool, BoxError> + Send + Sync>;

/// Decides whether an exception is ignored, globally or for one notifier
///
/// Conditions are evaluated on a snapshot taken when evaluation starts, so
/// adding or clearing conditions concurrently never blocks a decision.
pub struct IgnoreEvaluator {
    mode: ErrorMode,
    ignored_exceptions: RwLock<Vec<String>>,
    conditions: RwLock<Vec<IgnoreCondition>>,
    notifier_conditions: RwLock<HashMap<String, Vec<IgnoreCondition>>>,
}

impl IgnoreEvaluator {
    /// Create an evaluator with a static ignored-type list
    pub fn new(mode: ErrorMode, ignored_exceptions: Vec<String>) -> Self {
        Self {
            mode,
            ignored_exceptions: RwLock::new(ignored_exceptions),
            conditions: RwLock::new(Vec::new()),
            notifier_conditions: RwLock::new(HashMap::new()),
        }
    }

    /// Error handling mode
    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    /// The static ignored-type list
    pub fn ignored_exceptions(&self) -> Vec<String> {
        self.ignored_exceptions.read().clone()
    }

    /// Replace the static ignored-type list
    pub fn set_ignored_exceptions(&self, names: Vec<String>) {
        *self.ignored_exceptions.write() = names;
    }

    /// Add a type name to the static ignored-type list
    pub fn add_ignored_exception(&self, name: impl Into<String>) {
        let name = name.into();
        let mut names = self.ignored_exceptions.write();
        if !names.contains(&name) {
            names.push(name);
        }
    }

    /// Never notify when `condition` returns `true`
    pub fn ignore_if<F>(&self, condition: F)
    where
        F: Fn(&ExceptionRecord, &NotifyOptions) -> std::result::Result<bool, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.conditions.write().push(Arc::new(condition));
    }

    /// Never notify when the exception message matches `pattern`
    pub fn ignore_message_matching(&self, pattern: Regex) {
        self.ignore_if(move |exception, _| Ok(pattern.is_match(&exception.message)));
    }

    /// Skip the notifier `notifier` when `condition` returns `true`
    pub fn ignore_notifier_if<F>(&self, notifier: impl Into<String>, condition: F)
    where
        F: Fn(&ExceptionRecord, &NotifyOptions) -> std::result::Result<bool, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.notifier_conditions
            .write()
            .entry(notifier.into())
            .or_default()
            .push(Arc::new(condition));
    }

    /// Remove every global and per-notifier condition
    pub fn clear_ignore_conditions(&self) {
        self.conditions.write().clear();
        self.notifier_conditions.write().clear();
    }

    /// Number of global conditions
    pub fn condition_count(&self) -> usize {
        self.conditions.read().len()
    }

    /// Whether the exception's type, or any ancestor type, is ignored
    ///
    /// `extra` is a per-call override list unioned with the static list.
    pub fn is_ignored_type(&self, exception: &ExceptionRecord, extra: &[String]) -> bool {
        let names = self.ignored_exceptions.read();
        exception
            .type_identities()
            .any(|identity| names.iter().chain(extra).any(|name| name == identity))
    }

    /// Whether `exception` should never notify
    ///
    /// In tolerant mode a failing condition is logged and counts as `false`;
    /// in strict mode its error is returned.
    pub fn is_ignored(&self, exception: &ExceptionRecord, options: &NotifyOptions) -> Result<bool> {
        if self.is_ignored_type(exception, &options.ignore_exceptions) {
            debug!(exception = %exception.type_name, "Exception type is ignored");
            return Ok(true);
        }

        let conditions = self.conditions.read().clone();
        self.any_condition(&conditions, exception, options, None)
    }

    /// Whether `notifier` should be skipped for `exception`
    pub fn is_notifier_ignored(
        &self,
        exception: &ExceptionRecord,
        options: &NotifyOptions,
        notifier: &str,
    ) -> Result<bool> {
        let conditions = match self.notifier_conditions.read().get(notifier) {
            Some(conditions) => conditions.clone(),
            None => return Ok(false),
        };
        self.any_condition(&conditions, exception, options, Some(notifier))
    }

    fn any_condition(
        &self,
        conditions: &[IgnoreCondition],
        exception: &ExceptionRecord,
        options: &NotifyOptions,
        notifier: Option<&str>,
    ) -> Result<bool> {
        for condition in conditions {
            match condition(exception, options) {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(e) => {
                    if self.mode.is_strict() {
                        return Err(Error::IgnoreCondition(e));
                    }
                    warn!(
                        exception = %exception.type_name,
                        notifier = notifier.unwrap_or("*"),
                        error = %e,
                        "An error occurred when evaluating an ignore condition"
                    );
                }
            }
        }
        Ok(false)
    }
}

impl fmt::Debug for IgnoreEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IgnoreEvaluator")
            .field("mode", &self.mode)
            .field("ignored_exceptions", &*self.ignored_exceptions.read())
            .field("conditions", &self.conditions.read().len())
            .finish_non_exhaustive()
    }
}
