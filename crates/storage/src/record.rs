use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The lock stamped on an item by `load`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLock {
    pub holder: String,
    #[serde(with = "time::serde::rfc3339")]
    pub locked_until: OffsetDateTime,
}

impl ItemLock {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now >= self.locked_until
    }
}

/// A stored item as a backend keeps it.
///
/// `value` is `None` for an item that has been loaded (and therefore
/// locked) but never saved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockedItemRecord {
    pub value: Option<serde_json::Value>,
    pub lock: Option<ItemLock>,
}
