//! Notification dispatch

use metrics::counter;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::evaluator::IgnoreEvaluator;
use super::notifier::Notifier;
use super::registry::{NotifierRegistry, NotifierSpec};
use super::ErrorMode;
use crate::config::{default_ignored_exceptions, Config};
use crate::db;
use crate::error::{BoxError, Error, Result};
use crate::grouping::{GroupingEngine, NotificationPolicy};
use crate::models::{ExceptionRecord, NotifyOptions};

/// Process-wide exception notification state
///
/// Owns the ignore rules, the notifier registry and the optional grouping
/// engine. Build one at startup with [`ExceptionNotifier::from_config`] and
/// share it behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct ExceptionNotifier {
    evaluator: IgnoreEvaluator,
    registry: NotifierRegistry,
    grouping: Option<GroupingEngine>,
    /// Applied to the grouping engine whenever one is set
    policy: Option<NotificationPolicy>,
    mode: ErrorMode,
}

impl ExceptionNotifier {
    /// Baseline state: default ignore list, the `log` notifier, no grouping
    pub fn new(mode: ErrorMode) -> Self {
        Self {
            evaluator: IgnoreEvaluator::new(mode, default_ignored_exceptions()),
            registry: NotifierRegistry::default(),
            grouping: None,
            policy: None,
            mode,
        }
    }

    /// Replace the notifier registry
    pub fn with_registry(mut self, registry: NotifierRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Enable error grouping
    ///
    /// A trigger set with [`Self::with_notification_trigger`] replaces the
    /// engine's policy.
    pub fn with_grouping(mut self, engine: GroupingEngine) -> Self {
        self.grouping = Some(match &self.policy {
            Some(policy) => engine.with_policy(policy.clone()),
            None => engine,
        });
        self
    }

    /// Replace the static ignored-type list
    pub fn with_ignored_exceptions(self, names: Vec<String>) -> Self {
        self.evaluator.set_ignored_exceptions(names);
        self
    }

    /// Replace the grouping policy with `trigger`
    ///
    /// Applies to the current grouping engine and to any set later; only
    /// consulted while grouping is enabled.
    pub fn with_notification_trigger<F>(mut self, trigger: F) -> Self
    where
        F: Fn(&ExceptionRecord, u64) -> bool + Send + Sync + 'static,
    {
        let policy = NotificationPolicy::custom(trigger);
        self.grouping = self
            .grouping
            .map(|engine| engine.with_policy(policy.clone()));
        self.policy = Some(policy);
        self
    }

    /// Build from loaded configuration
    ///
    /// Connects the counter store when grouping is enabled and builds every
    /// configured notifier through the registry's constructors.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let mode = ErrorMode::from_testing_mode(config.testing_mode);

        let registry = if config.baseline_notifier {
            NotifierRegistry::default()
        } else {
            NotifierRegistry::empty()
        };
        for (name, notifier_config) in &config.notifiers {
            registry.register(name.as_str(), NotifierSpec::config(notifier_config.clone()))?;
        }

        let evaluator = IgnoreEvaluator::new(mode, config.ignore.exceptions.clone());
        for pattern in &config.ignore.message_patterns {
            let regex = Regex::new(pattern).map_err(|e| {
                Error::config(format!("invalid ignore.message_patterns entry '{pattern}': {e}"))
            })?;
            evaluator.ignore_message_matching(regex);
        }

        let grouping = if config.grouping.enabled {
            let store = db::connect(&config.store).await?;
            Some(GroupingEngine::new(store, config.grouping.period))
        } else {
            None
        };

        info!(
            notifiers = ?registry.list_names(),
            grouping = grouping.is_some(),
            ?mode,
            "Exception notifier initialised"
        );

        Ok(Self {
            evaluator,
            registry,
            grouping,
            policy: None,
            mode,
        })
    }

    /// Error handling mode
    pub fn mode(&self) -> ErrorMode {
        self.mode
    }

    /// Ignore rules
    pub fn evaluator(&self) -> &IgnoreEvaluator {
        &self.evaluator
    }

    /// Notifier registry
    pub fn registry(&self) -> &NotifierRegistry {
        &self.registry
    }

    /// Grouping engine, when grouping is enabled
    pub fn grouping(&self) -> Option<&GroupingEngine> {
        self.grouping.as_ref()
    }

    /// Register a ready notifier under `name`
    pub fn register_notifier<N: Notifier + 'static>(
        &self,
        name: impl Into<String>,
        notifier: N,
    ) -> Result<()> {
        self.registry.register_notifier(name, notifier)
    }

    /// Register a notifier by instance or configuration
    pub fn register(&self, name: impl Into<String>, spec: NotifierSpec) -> Result<()> {
        self.registry.register(name, spec)
    }

    /// Remove the notifier registered under `name`
    pub fn unregister_notifier(&self, name: &str) -> Option<Arc<dyn Notifier>> {
        self.registry.unregister(name)
    }

    /// Registered notifier names in registration order
    pub fn notifier_names(&self) -> Vec<String> {
        self.registry.list_names()
    }

    /// Never notify when `condition` returns `true`
    pub fn ignore_if<F>(&self, condition: F)
    where
        F: Fn(&ExceptionRecord, &NotifyOptions) -> std::result::Result<bool, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.evaluator.ignore_if(condition);
    }

    /// Skip `notifier` when `condition` returns `true`
    pub fn ignore_notifier_if<F>(&self, notifier: impl Into<String>, condition: F)
    where
        F: Fn(&ExceptionRecord, &NotifyOptions) -> std::result::Result<bool, BoxError>
            + Send
            + Sync
            + 'static,
    {
        self.evaluator.ignore_notifier_if(notifier, condition);
    }

    /// Remove every ignore condition
    pub fn clear_ignore_conditions(&self) {
        self.evaluator.clear_ignore_conditions();
    }

    /// Whether `exception` would be ignored with `options`
    pub fn is_ignored(&self, exception: &ExceptionRecord, options: &NotifyOptions) -> Result<bool> {
        self.evaluator.is_ignored(exception, options)
    }

    /// Restore the baseline notifier set and drop every ignore condition
    pub fn reset(&self) {
        self.registry.reset();
        self.evaluator.clear_ignore_conditions();
    }

    /// Run `exception` through ignore rules and grouping, then notify
    ///
    /// Returns `Ok(true)` when at least one notifier was attempted. Each
    /// notifier runs in turn; in tolerant mode a failing or unknown notifier
    /// is logged and the rest still run, in strict mode the first failure
    /// is returned.
    pub async fn notify(
        &self,
        exception: &ExceptionRecord,
        mut options: NotifyOptions,
    ) -> Result<bool> {
        counter!("tripwire_exceptions_total").increment(1);

        if self.evaluator.is_ignored(exception, &options)? {
            counter!("tripwire_exceptions_ignored_total").increment(1);
            debug!(exception = %exception.type_name, "Exception ignored");
            return Ok(false);
        }

        if let Some(grouping) = &self.grouping {
            if grouping.should_suppress(exception, &mut options).await {
                counter!("tripwire_exceptions_suppressed_total").increment(1);
                return Ok(false);
            }
        }

        let entries = self.registry.snapshot();
        let targets = match options.notifiers.take() {
            Some(selector) => selector.names(),
            None => entries.iter().map(|(name, _)| name.clone()).collect(),
        };

        let mut attempted = false;
        for name in targets {
            if self.evaluator.is_notifier_ignored(exception, &options, &name)? {
                debug!(exception = %exception.type_name, notifier = %name, "Notifier skipped");
                continue;
            }
            attempted = true;

            if let Err(e) = fire_notification(&entries, &name, exception, &options).await {
                counter!("tripwire_notification_failures_total", "notifier" => name.clone())
                    .increment(1);
                if self.mode.is_strict() {
                    return Err(e);
                }
                warn!(exception = %exception.type_name, notifier = %name, error = %e, "Notification failed");
            }
        }

        Ok(attempted)
    }
}

impl Default for ExceptionNotifier {
    fn default() -> Self {
        Self::new(ErrorMode::default())
    }
}

async fn fire_notification(
    entries: &[(String, Arc<dyn Notifier>)],
    name: &str,
    exception: &ExceptionRecord,
    options: &NotifyOptions,
) -> Result<()> {
    let notifier = entries
        .iter()
        .find(|(existing, _)| existing == name)
        .map(|(_, notifier)| notifier)
        .ok_or_else(|| Error::NotRegistered(name.to_string()))?;

    notifier
        .send(exception, options.clone())
        .await
        .map_err(|source| Error::Notifier {
            name: name.to_string(),
            source,
        })?;

    counter!("tripwire_notifications_total", "notifier" => name.to_string()).increment(1);
    Ok(())
}
