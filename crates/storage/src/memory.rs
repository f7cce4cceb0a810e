//! In-memory backends.
//!
//! Both maps are process-local and lose everything on restart. They are the
//! default for `quayside serve` and the reference backend for the
//! conformance suite.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use crate::error::StorageError;
use crate::record::{ItemLock, LockedItemRecord};
use crate::traits::{LockingMap, NonLockingMap};

/// Default lock duration for a loaded item.
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(60);

type ItemKey = (String, String);

fn item_key(partition_key: &str, sort_key: &str) -> ItemKey {
    (partition_key.to_string(), sort_key.to_string())
}

/// [`LockingMap`] backed by a mutex-guarded `BTreeMap`.
pub struct MemoryLockingMap {
    lock_duration: Duration,
    items: Mutex<BTreeMap<ItemKey, LockedItemRecord>>,
}

impl MemoryLockingMap {
    pub fn new(lock_duration: Duration) -> Self {
        Self {
            lock_duration,
            items: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }
}

impl Default for MemoryLockingMap {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_DURATION)
    }
}

#[async_trait]
impl LockingMap for MemoryLockingMap {
    async fn load(
        &self,
        lock_holder: &str,
        partition_key: &str,
        sort_key: &str,
        default: Value,
    ) -> Result<Value, StorageError> {
        let mut items = self.items.lock().await;
        let now = OffsetDateTime::now_utc();
        let item = items
            .entry(item_key(partition_key, sort_key))
            .or_default();

        if let Some(lock) = &item.lock {
            if lock.holder != lock_holder && !lock.is_expired_at(now) {
                return Err(StorageError::ItemIsLocked {
                    partition_key: partition_key.to_string(),
                    sort_key: sort_key.to_string(),
                    lock_holder: lock.holder.clone(),
                });
            }
        }

        item.lock = Some(ItemLock {
            holder: lock_holder.to_string(),
            locked_until: now + self.lock_duration,
        });
        Ok(item.value.clone().unwrap_or(default))
    }

    async fn save(
        &self,
        lock_holder: &str,
        partition_key: &str,
        sort_key: &str,
        value: Value,
    ) -> Result<(), StorageError> {
        let mut items = self.items.lock().await;
        let now = OffsetDateTime::now_utc();
        let key = item_key(partition_key, sort_key);

        let Some(item) = items.get_mut(&key) else {
            return Err(StorageError::ItemNotLocked {
                partition_key: partition_key.to_string(),
                sort_key: sort_key.to_string(),
                lock_holder: None,
            });
        };

        match &item.lock {
            Some(lock) if lock.holder == lock_holder => {
                if lock.is_expired_at(now) {
                    return Err(StorageError::LockHasExpired {
                        partition_key: partition_key.to_string(),
                        sort_key: sort_key.to_string(),
                    });
                }
            }
            other => {
                return Err(StorageError::ItemNotLocked {
                    partition_key: partition_key.to_string(),
                    sort_key: sort_key.to_string(),
                    lock_holder: other.as_ref().map(|l| l.holder.clone()),
                });
            }
        }

        item.value = Some(value);
        item.lock = None;
        Ok(())
    }

    async fn unlock(
        &self,
        lock_holder: &str,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<(), StorageError> {
        let mut items = self.items.lock().await;
        let key = item_key(partition_key, sort_key);

        let Some(item) = items.get_mut(&key) else {
            return Ok(());
        };
        let current_holder = item.lock.as_ref().map(|lock| lock.holder.clone());
        match current_holder {
            None => Ok(()),
            Some(holder) if holder == lock_holder => {
                item.lock = None;
                // A placeholder created by a load that never saved.
                if item.value.is_none() {
                    items.remove(&key);
                }
                Ok(())
            }
            Some(holder) => Err(StorageError::ItemNotLocked {
                partition_key: partition_key.to_string(),
                sort_key: sort_key.to_string(),
                lock_holder: Some(holder),
            }),
        }
    }

    async fn peek(
        &self,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<Option<Value>, StorageError> {
        let items = self.items.lock().await;
        Ok(items
            .get(&item_key(partition_key, sort_key))
            .and_then(|item| item.value.clone()))
    }
}

/// [`NonLockingMap`] backed by nested sorted maps.
#[derive(Default)]
pub struct MemoryNonLockingMap {
    partitions: RwLock<BTreeMap<String, BTreeMap<String, Value>>>,
}

impl MemoryNonLockingMap {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonLockingMap for MemoryNonLockingMap {
    async fn set_item(
        &self,
        partition_key: &str,
        sort_key: &str,
        value: Value,
    ) -> Result<(), StorageError> {
        self.partitions
            .write()
            .await
            .entry(partition_key.to_string())
            .or_default()
            .insert(sort_key.to_string(), value);
        Ok(())
    }

    async fn get_item(
        &self,
        partition_key: &str,
        sort_key: &str,
    ) -> Result<Option<Value>, StorageError> {
        Ok(self
            .partitions
            .read()
            .await
            .get(partition_key)
            .and_then(|p| p.get(sort_key))
            .cloned())
    }

    async fn get_partition_values_by_sort_key_prefix(
        &self,
        partition_key: &str,
        prefix: &str,
    ) -> Result<Vec<Value>, StorageError> {
        let partitions = self.partitions.read().await;
        let Some(partition) = partitions.get(partition_key) else {
            return Ok(Vec::new());
        };
        Ok(partition
            .range(prefix.to_string()..)
            .take_while(|(sort_key, _)| sort_key.starts_with(prefix))
            .map(|(_, value)| value.clone())
            .collect())
    }

    async fn delete_partition(&self, partition_key: &str) -> Result<(), StorageError> {
        self.partitions.write().await.remove(partition_key);
        Ok(())
    }
}
