use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;

/// A partitioned key/value store with per-item optimistic locking.
///
/// Items are addressed by `(partition_key, sort_key)` and hold a JSON value.
///
/// ## Lock cycle
///
/// 1. `load(holder, ..)` stamps the item with `holder` and an expiry of
///    `now + lock_duration`, and returns the current value (or `default` for
///    an item that was never saved).
/// 2. The caller mutates the value in memory.
/// 3. `save(holder, ..)` writes the value and releases the lock, or
///    `unlock(holder, ..)` releases it without writing.
///
/// `load` fails with `ItemIsLocked` while another holder's lock is
/// unexpired. After expiry any holder may load the item again.
/// `save` fails with `ItemNotLocked` if `holder` is not the current lock
/// holder, and with `LockHasExpired` if it is but the lock ran out.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared through an
/// `Arc` by concurrent request handlers.
#[async_trait]
pub trait LockingMap: Send + Sync + 'static {
    // ── Lock cycle ───────────────────────────────────────────────────────────

    /// Lock the item for `lock_holder` and return its value.
    async fn load(
        &self,
        lock_holder: &str,
        partition_key: &str,
        sort_key: &str,
        default: Value,
    ) -> Result<Value, StorageError>;

    /// Write the value and release the lock held by `lock_holder`.
    async fn save(
        &self,
        lock_holder: &str,
        partition_key: &str,
        sort_key: &str,
        value: Value,
    ) -> Result<(), StorageError>;

    /// Release the lock held by `lock_holder` without writing.
    ///
    /// Unlocking an item that nobody holds is a no-op.
    async fn unlock(
        &self,
        lock_holder: &str,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<(), StorageError>;

    // ── Unlocked reads ───────────────────────────────────────────────────────

    /// Read the last saved value without taking the lock.
    async fn peek(&self, partition_key: &str, sort_key: &str)
        -> Result<Option<Value>, StorageError>;
}

/// A sorted-partition key/value store without locking, for immutable or
/// write-once items (configurations, recorded exchanges).
#[async_trait]
pub trait NonLockingMap: Send + Sync + 'static {
    async fn set_item(
        &self,
        partition_key: &str,
        sort_key: &str,
        value: Value,
    ) -> Result<(), StorageError>;

    async fn get_item(
        &self,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<Option<Value>, StorageError>;

    /// All values in the partition whose sort key starts with `prefix`,
    /// ordered by sort key.
    async fn get_partition_values_by_sort_key_prefix(
        &self,
        partition_key: &str,
        prefix: &str,
    ) -> Result<Vec<Value>, StorageError>;

    /// Remove every item in the partition.
    async fn delete_partition(&self, partition_key: &str) -> Result<(), StorageError>;
}
