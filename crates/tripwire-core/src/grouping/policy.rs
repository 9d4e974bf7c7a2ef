//! Notify-or-suppress policy for grouped errors

use std::fmt;
use std::sync::Arc;

use crate::models::ExceptionRecord;

/// User-supplied decision: given the exception and its accumulated count,
/// return `true` to notify
pub type NotificationTrigger = Arc<dyn Fn(&ExceptionRecord, u64) -> bool + Send + Sync>;

/// Default throttling curve
///
/// Always notifies on the first occurrence, then on 3, 6 and 9, then on
/// every power of ten. Sustained repetition produces a logarithmically
/// decaying stream of notifications.
pub fn send_notification(count: u64) -> bool {
    match count {
        0 => false,
        1 => true,
        2..=9 => count % 3 == 0,
        _ => is_power_of_ten(count),
    }
}

fn is_power_of_ten(mut n: u64) -> bool {
    while n >= 10 && n % 10 == 0 {
        n /= 10;
    }
    n == 1
}

/// How the grouping engine turns a count into a decision
#[derive(Clone, Default)]
pub enum NotificationPolicy {
    /// [`send_notification`]
    #[default]
    Default,
    /// A caller-supplied trigger
    Custom(NotificationTrigger),
}

impl NotificationPolicy {
    /// Wrap a closure as a custom policy
    pub fn custom<F>(trigger: F) -> Self
    where
        F: Fn(&ExceptionRecord, u64) -> bool + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(trigger))
    }

    /// Whether an exception seen `count` times should notify
    pub fn should_notify(&self, exception: &ExceptionRecord, count: u64) -> bool {
        match self {
            Self::Default => send_notification(count),
            Self::Custom(trigger) => trigger(exception, count),
        }
    }
}

impl fmt::Debug for NotificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
