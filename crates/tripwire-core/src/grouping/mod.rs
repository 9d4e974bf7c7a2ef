//! Error grouping and notification throttling
//!
//! Repeated occurrences of the same error are counted in a TTL-bounded
//! store and only some of them are allowed through to the notifiers.

mod engine;
mod key;
mod policy;

pub use engine::{GroupingEngine, DEFAULT_GROUPING_PERIOD};
pub use key::{GroupingKey, GroupingKeys, KEY_PREFIX};
pub use policy::{send_notification, NotificationPolicy, NotificationTrigger};
