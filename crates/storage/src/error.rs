/// All errors that can be returned by a locking or non-locking map.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Another caller holds an unexpired lock on the item. Transient: the
    /// caller should back off and retry.
    #[error("{partition_key}/{sort_key} is locked by {lock_holder}")]
    ItemIsLocked {
        partition_key: String,
        sort_key: String,
        lock_holder: String,
    },

    /// The caller tried to save or unlock an item it does not hold the lock on.
    #[error(
        "{partition_key}/{sort_key} cannot save: item is locked by {}",
        .lock_holder.as_deref().unwrap_or("nobody")
    )]
    ItemNotLocked {
        partition_key: String,
        sort_key: String,
        lock_holder: Option<String>,
    },

    /// The caller held the lock, but it expired before the save.
    #[error("{partition_key}/{sort_key} cannot save: lock has expired")]
    LockHasExpired {
        partition_key: String,
        sort_key: String,
    },

    /// Lock contention outlasted the retry policy.
    #[error(
        "{description}: gave up after {attempts} attempts waiting for {partition_key}/{sort_key}"
    )]
    RetriesExhausted {
        description: String,
        partition_key: String,
        sort_key: String,
        attempts: u32,
    },

    /// A stored value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A backend-specific storage error (connection, throttling, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Only lock contention is worth retrying; every other variant is fatal
    /// for the step that hit it.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::ItemIsLocked { .. })
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_item_is_locked_is_retryable() {
        let locked = StorageError::ItemIsLocked {
            partition_key: "sandbox#1".into(),
            sort_key: "state".into(),
            lock_holder: "a".into(),
        };
        let expired = StorageError::LockHasExpired {
            partition_key: "sandbox#1".into(),
            sort_key: "state".into(),
        };
        assert!(locked.is_retryable());
        assert!(!expired.is_retryable());
    }

    #[test]
    fn not_locked_message_names_the_holder() {
        let err = StorageError::ItemNotLocked {
            partition_key: "session#1".into(),
            sort_key: "state#orchestrator".into(),
            lock_holder: Some("other".into()),
        };
        assert_eq!(
            err.to_string(),
            "session#1/state#orchestrator cannot save: item is locked by other"
        );
    }
}
