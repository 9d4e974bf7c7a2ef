//! Grouping decision engine

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::key::{GroupingKey, GroupingKeys};
use super::policy::NotificationPolicy;
use crate::db::{CounterStore, MemoryStore};
use crate::models::{ExceptionRecord, NotifyOptions};

/// Default time a group stays alive without new occurrences
pub const DEFAULT_GROUPING_PERIOD: Duration = Duration::from_secs(5 * 60);

/// Counts repeated exceptions and decides which occurrences notify
///
/// The read-increment-write against the store is not atomic. Concurrent
/// occurrences of one group can read the same count and lose an increment;
/// grouping is approximate and accepts that.
pub struct GroupingEngine {
    store: Arc<dyn CounterStore>,
    /// Used for any read or write the configured store fails
    fallback: MemoryStore,
    period: Duration,
    policy: NotificationPolicy,
}

impl GroupingEngine {
    /// Create an engine over `store` with the default policy
    pub fn new(store: Arc<dyn CounterStore>, period: Duration) -> Self {
        Self {
            store,
            fallback: MemoryStore::new(),
            period,
            policy: NotificationPolicy::Default,
        }
    }

    /// Replace the notification policy
    pub fn with_policy(mut self, policy: NotificationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Grouping period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Current policy
    pub fn policy(&self) -> &NotificationPolicy {
        &self.policy
    }

    /// Record one occurrence and return the group's accumulated count
    ///
    /// The message key is consulted first, then the backtrace key. A new
    /// group initialises both keys so that a later exception matching
    /// either one joins it.
    pub async fn group_error(&self, exception: &ExceptionRecord) -> u64 {
        let keys = GroupingKeys::for_exception(exception);

        if let Some(count) = self.error_count(keys.message).await {
            let accumulated = count.saturating_add(1);
            self.save_error_count(keys.message, accumulated).await;
            return accumulated;
        }

        if let Some(count) = self.error_count(keys.backtrace).await {
            let accumulated = count.saturating_add(1);
            self.save_error_count(keys.backtrace, accumulated).await;
            return accumulated;
        }

        debug!(
            exception = %exception.type_name,
            message_key = %keys.message,
            backtrace_key = %keys.backtrace,
            "New error group"
        );
        self.save_error_count(keys.backtrace, 1).await;
        self.save_error_count(keys.message, 1).await;
        1
    }

    /// Record one occurrence and decide whether to hold back its notification
    ///
    /// The accumulated count is written to `options.accumulated_errors_count`.
    pub async fn should_suppress(
        &self,
        exception: &ExceptionRecord,
        options: &mut NotifyOptions,
    ) -> bool {
        let count = self.group_error(exception).await;
        options.accumulated_errors_count = Some(count);

        let notify = self.policy.should_notify(exception, count);
        debug!(
            exception = %exception.type_name,
            accumulated_errors_count = count,
            notify,
            "Grouping decision"
        );
        !notify
    }

    async fn error_count(&self, key: GroupingKey) -> Option<u64> {
        let key = key.to_key();
        match self.store.read(&key).await {
            Ok(count) => count,
            Err(e) => {
                warn!(key = %key, error = %e, "Counter store read failed, using fallback store");
                self.fallback.read(&key).await.ok().flatten()
            }
        }
    }

    async fn save_error_count(&self, key: GroupingKey, count: u64) {
        let key = key.to_key();
        if let Err(e) = self.store.write(&key, count, self.period).await {
            warn!(key = %key, error = %e, "Counter store write failed, using fallback store");
            // The in-process store cannot fail
            let _ = self.fallback.write(&key, count, self.period).await;
        }
    }
}

impl fmt::Debug for GroupingEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupingEngine")
            .field("period", &self.period)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn engine() -> (GroupingEngine, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (
            GroupingEngine::new(store.clone(), DEFAULT_GROUPING_PERIOD),
            store,
        )
    }

    fn boom() -> ExceptionRecord {
        ExceptionRecord::new("RuntimeError", "boom").with_backtrace(["/a:1"])
    }

    #[tokio::test]
    async fn test_new_group_writes_both_keys() {
        let (engine, store) = engine();
        let exception = boom();

        assert_eq!(engine.group_error(&exception).await, 1);

        let keys = GroupingKeys::for_exception(&exception);
        assert_eq!(store.read(&keys.backtrace.to_key()).await.unwrap(), Some(1));
        assert_eq!(store.read(&keys.message.to_key()).await.unwrap(), Some(1));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_same_backtrace_different_message_share_group() {
        let (engine, _) = engine();
        let first = ExceptionRecord::new("RuntimeError", "user 1 missing").with_backtrace(["/app/users.rs:10"]);
        let second = ExceptionRecord::new("RuntimeError", "user 2 missing").with_backtrace(["/app/users.rs:10"]);

        assert_eq!(engine.group_error(&first).await, 1);
        assert_eq!(engine.group_error(&second).await, 2);
        assert_eq!(engine.group_error(&second).await, 3);
    }

    #[tokio::test]
    async fn test_same_message_different_backtrace_share_group() {
        let (engine, _) = engine();
        let first = ExceptionRecord::new("RuntimeError", "boom").with_backtrace(["/a:1"]);
        let second = ExceptionRecord::new("RuntimeError", "boom").with_backtrace(["/b:2"]);

        assert_eq!(engine.group_error(&first).await, 1);
        assert_eq!(engine.group_error(&second).await, 2);
    }

    #[tokio::test]
    async fn test_different_types_are_independent() {
        let (engine, _) = engine();
        let runtime = boom();
        let argument = ExceptionRecord::new("ArgumentError", "boom").with_backtrace(["/a:1"]);

        let runtime_keys = GroupingKeys::for_exception(&runtime);
        let argument_keys = GroupingKeys::for_exception(&argument);
        assert_ne!(runtime_keys.backtrace, argument_keys.backtrace);
        assert_ne!(runtime_keys.message, argument_keys.message);

        assert_eq!(engine.group_error(&runtime).await, 1);
        assert_eq!(engine.group_error(&argument).await, 1);
        assert_eq!(engine.group_error(&runtime).await, 2);
        assert_eq!(engine.group_error(&argument).await, 2);
    }

    #[tokio::test]
    async fn test_thousand_occurrences_notify_seven_times() {
        let (engine, _) = engine();
        let exception = boom();
        let mut notified = Vec::new();

        for _ in 0..1000 {
            let mut options = NotifyOptions::new();
            if !engine.should_suppress(&exception, &mut options).await {
                notified.push(options.accumulated_errors_count.unwrap());
            }
        }

        assert_eq!(notified, vec![1, 3, 6, 9, 10, 100, 1000]);
    }

    #[tokio::test]
    async fn test_should_suppress_records_count() {
        let (engine, _) = engine();
        let exception = boom();
        let mut options = NotifyOptions::new();

        assert!(!engine.should_suppress(&exception, &mut options).await);
        assert_eq!(options.accumulated_errors_count, Some(1));

        assert!(engine.should_suppress(&exception, &mut options).await);
        assert_eq!(options.accumulated_errors_count, Some(2));
    }

    #[tokio::test]
    async fn test_custom_policy_receives_count() {
        let (engine, _) = engine();
        let engine = engine.with_policy(NotificationPolicy::custom(|_, count| count >= 2));
        let exception = boom();
        let mut options = NotifyOptions::new();

        assert!(engine.should_suppress(&exception, &mut options).await);
        assert!(!engine.should_suppress(&exception, &mut options).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_count_restarts_after_period() {
        let store = Arc::new(MemoryStore::new());
        let engine = GroupingEngine::new(store, Duration::from_secs(60));
        let exception = boom();

        assert_eq!(engine.group_error(&exception).await, 1);
        assert_eq!(engine.group_error(&exception).await, 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(engine.group_error(&exception).await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_keeps_group_alive() {
        let store = Arc::new(MemoryStore::new());
        let engine = GroupingEngine::new(store, Duration::from_secs(60));
        let exception = boom();

        for expected in 1..=5 {
            assert_eq!(engine.group_error(&exception).await, expected);
            tokio::time::advance(Duration::from_secs(45)).await;
        }
    }

    struct UnavailableStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CounterStore for UnavailableStore {
        async fn read(&self, _key: &str) -> Result<Option<u64>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn write(&self, _key: &str, _value: u64, _ttl: Duration) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Connection("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_memory() {
        let store = Arc::new(UnavailableStore {
            calls: AtomicUsize::new(0),
        });
        let engine = GroupingEngine::new(store.clone(), DEFAULT_GROUPING_PERIOD);
        let exception = boom();

        assert_eq!(engine.group_error(&exception).await, 1);
        assert_eq!(engine.group_error(&exception).await, 2);
        assert!(store.calls.load(Ordering::SeqCst) > 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_contention_keeps_one_bounded_group() {
        const TASKS: u64 = 8;
        const CALLS: u64 = 250;

        let store = Arc::new(MemoryStore::new());
        let engine = Arc::new(GroupingEngine::new(store.clone(), DEFAULT_GROUPING_PERIOD));

        let tasks: Vec<_> = (0..TASKS)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    let mut counts = Vec::new();
                    for _ in 0..CALLS {
                        counts.push(engine.group_error(&boom()).await);
                    }
                    counts
                })
            })
            .collect();

        let mut observed = Vec::new();
        for task in tasks {
            observed.extend(task.await.unwrap());
        }

        // Lost increments are accepted; counts stay inside one group's range
        let total = TASKS * CALLS;
        assert_eq!(observed.len() as u64, total);
        assert!(observed.iter().all(|&count| (1..=total).contains(&count)));

        let key = GroupingKeys::for_exception(&boom()).message.to_key();
        let settled = store.read(&key).await.unwrap().unwrap();
        assert!((1..=total).contains(&settled));
        assert_eq!(engine.group_error(&boom()).await, settled + 1);
        assert_eq!(engine.group_error(&boom()).await, settled + 2);
        assert_eq!(store.len(), 2);
    }
}
