//! Counter storage for error grouping
//!
//! Grouping needs nothing more than a TTL-bounded key→counter map. Any
//! cache that can read an integer and write one with an expiry satisfies
//! [`CounterStore`]; an in-process store and a Redis store are provided.

mod memory;
mod redis;

pub use memory::{MemoryStore, SWEEP_INTERVAL};
pub use redis::RedisStore;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{StoreBackend, StoreConfig};

/// Errors raised by a counter store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Could not reach the backing store
    #[error("Store connection failed: {0}")]
    Connection(String),

    /// The store rejected a command
    #[error("Store command failed: {0}")]
    Command(String),

    /// A stored value could not be decoded as a counter
    #[error("Invalid counter value for key '{key}': {value}")]
    InvalidValue {
        /// Store key, prefix included
        key: String,
        /// Raw stored value
        value: String,
    },
}

/// A time-windowed key→counter store
///
/// `read` and `write` are deliberately separate calls: grouping performs a
/// plain read-increment-write and tolerates the lost updates this allows
/// under contention.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Read the counter stored under `key`, `None` if absent or expired
    async fn read(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Store `value` under `key`, expiring after `ttl`
    ///
    /// A zero `ttl` stores the counter without expiry.
    async fn write(&self, key: &str, value: u64, ttl: Duration) -> Result<(), StoreError>;
}

/// Build the counter store selected by configuration
pub async fn connect(config: &StoreConfig) -> crate::error::Result<Arc<dyn CounterStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Redis => {
            let store = RedisStore::new(&config.redis).await?;
            Ok(Arc::new(store))
        }
    }
}
