//! Exception alerting for Tripwire
//!
//! Ignore rules, the notifier registry and the dispatcher that fans a
//! notification out to the selected notifiers.

mod dispatcher;
mod evaluator;
mod notifier;
mod registry;

pub use dispatcher::ExceptionNotifier;
pub use evaluator::{IgnoreCondition, IgnoreEvaluator};
pub use notifier::{FnNotifier, LogLevel, LogNotifier, Notifier, NotifierError, WebhookNotifier};
pub use registry::{NotifierConstructor, NotifierRegistry, NotifierSpec, BASELINE_NOTIFIER};

/// How failures inside ignore conditions and notifiers are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorMode {
    /// Log the failure and carry on
    #[default]
    Tolerant,
    /// Return the failure to the caller
    Strict,
}

impl ErrorMode {
    /// `testing_mode = true` selects [`ErrorMode::Strict`]
    pub fn from_testing_mode(testing_mode: bool) -> Self {
        if testing_mode {
            Self::Strict
        } else {
            Self::Tolerant
        }
    }

    /// Whether failures propagate
    pub fn is_strict(self) -> bool {
        self == Self::Strict
    }
}
