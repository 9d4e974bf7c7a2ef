//! # Tripwire
//!
//! Exception notification middleware.
//!
//! Tripwire receives the errors an application fails with, decides which of
//! them deserve a notification and delivers those to pluggable notifiers.
//!
//! ## Architecture
//!
//! - **Ignore rules**: a static list of ignored exception types plus runtime conditions
//! - **Grouping**: repeated errors are counted in a TTL-bounded store and throttled
//! - **Notifiers**: a named registry of channels (log, webhook, custom)
//! - **Dispatcher**: [`ExceptionNotifier::notify`] ties the three together
//!
//! ## Quick Start
//!
//! ```no_run
//! use tripwire::prelude::*;
//!
//! # async fn run() -> tripwire::Result<()> {
//! let config = Config::load(None)?;
//! let notifier = ExceptionNotifier::from_config(&config).await?;
//!
//! let exception = ExceptionRecord::new("RuntimeError", "boom").with_backtrace(["src/orders.rs:42"]);
//! notifier.notify(&exception, NotifyOptions::new()).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod alerting;
pub mod config;
pub mod db;
pub mod error;
pub mod grouping;
pub mod models;

pub use alerting::{ErrorMode, ExceptionNotifier};
pub use config::Config;
pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::alerting::{
        ErrorMode, ExceptionNotifier, FnNotifier, Notifier, NotifierError, NotifierRegistry,
        NotifierSpec,
    };
    pub use crate::config::Config;
    pub use crate::db::{CounterStore, MemoryStore};
    pub use crate::error::{Error, Result};
    pub use crate::grouping::{GroupingEngine, NotificationPolicy};
    pub use crate::models::*;
}
