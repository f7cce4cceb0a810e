//! Load-lock / mutate / save-unlock cycle with bounded retry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::traits::LockingMap;

/// Backoff policy for `ItemIsLocked` contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 40,
            initial_backoff: Duration::from_millis(25),
            max_backoff: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based), doubling up to the cap.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

/// Runs state transitions against a [`LockingMap`] item.
///
/// Each call takes a fresh lock holder id, so two calls never share a lock
/// even inside one process.
#[derive(Clone)]
pub struct StatefulExecutor {
    map: Arc<dyn LockingMap>,
    retry: RetryPolicy,
}

impl StatefulExecutor {
    pub fn new(map: Arc<dyn LockingMap>, retry: RetryPolicy) -> Self {
        Self { map, retry }
    }

    pub fn map(&self) -> &Arc<dyn LockingMap> {
        &self.map
    }

    /// Load and lock the item, run `transition` on its value, save the value
    /// it returns and unlock.
    ///
    /// If `transition` fails the item is unlocked unchanged and the error is
    /// returned. `ItemIsLocked` is retried per the [`RetryPolicy`]; every
    /// other storage error is returned immediately.
    pub async fn execute<T, E, F, Fut>(
        &self,
        description: &str,
        partition_key: &str,
        sort_key: &str,
        default: Value,
        transition: F,
    ) -> Result<T, E>
    where
        F: FnOnce(Value) -> Fut,
        Fut: Future<Output = Result<(Value, T), E>>,
        E: From<StorageError>,
    {
        let lock_holder = Uuid::new_v4().to_string();
        let state = self
            .load_with_retry(description, &lock_holder, partition_key, sort_key, default)
            .await?;

        match transition(state).await {
            Ok((new_state, output)) => {
                self.map
                    .save(&lock_holder, partition_key, sort_key, new_state)
                    .await?;
                Ok(output)
            }
            Err(e) => {
                if let Err(unlock_error) = self
                    .map
                    .unlock(&lock_holder, partition_key, sort_key)
                    .await
                {
                    tracing::warn!(
                        description,
                        partition_key,
                        sort_key,
                        error = %unlock_error,
                        "failed to unlock item after a failed transition"
                    );
                }
                Err(e)
            }
        }
    }

    async fn load_with_retry(
        &self,
        description: &str,
        lock_holder: &str,
        partition_key: &str,
        sort_key: &str,
        default: Value,
    ) -> Result<Value, StorageError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self
                .map
                .load(lock_holder, partition_key, sort_key, default.clone())
                .await
            {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    tracing::debug!(
                        description,
                        partition_key,
                        sort_key,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "item is locked, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) if e.is_retryable() => {
                    tracing::error!(
                        description,
                        partition_key,
                        sort_key,
                        attempt,
                        "lock retries exhausted"
                    );
                    return Err(StorageError::RetriesExhausted {
                        description: description.to_string(),
                        partition_key: partition_key.to_string(),
                        sort_key: sort_key.to_string(),
                        attempts: attempt,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}
