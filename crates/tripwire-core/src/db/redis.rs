//! Redis-backed counter store

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;
use std::time::Duration;
use tracing::debug;

use super::{CounterStore, StoreError};
use crate::config::RedisConfig;
use crate::error::{Error, Result};

/// Counter store shared between processes through Redis
///
/// Keys are namespaced with the configured prefix so several applications
/// can share one Redis database.
#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
    key_prefix: String,
}

impl RedisStore {
    /// Create a new Redis connection pool
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let cfg = PoolConfig::from_url(&config.url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::Store(StoreError::Connection(e.to_string())))?;

        debug!(url = %config.url, prefix = %config.key_prefix, "Redis counter store created");

        Ok(Self {
            pool,
            key_prefix: config.key_prefix.clone(),
        })
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;
        Ok(())
    }

    fn full_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    async fn connection(&self) -> std::result::Result<Connection, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

/// Whole seconds for `SETEX`, rounding up so short periods never become 0
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn read(&self, key: &str) -> std::result::Result<Option<u64>, StoreError> {
        let full_key = self.full_key(key);
        let mut conn = self.connection().await?;

        let value: Option<String> = conn
            .get(&full_key)
            .await
            .map_err(|e| StoreError::Command(e.to_string()))?;

        value
            .map(|raw| {
                raw.trim().parse::<u64>().map_err(|_| StoreError::InvalidValue {
                    key: full_key.clone(),
                    value: raw,
                })
            })
            .transpose()
    }

    async fn write(&self, key: &str, value: u64, ttl: Duration) -> std::result::Result<(), StoreError> {
        let full_key = self.full_key(key);
        let mut conn = self.connection().await?;

        if ttl.is_zero() {
            let _: () = conn
                .set(&full_key, value)
                .await
                .map_err(|e| StoreError::Command(e.to_string()))?;
        } else {
            let _: () = conn
                .set_ex(&full_key, value, ttl_seconds(ttl))
                .await
                .map_err(|e| StoreError::Command(e.to_string()))?;
        }

        Ok(())
    }
}
