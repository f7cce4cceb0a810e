//! Where sandbox state lives in the stores.

use time::OffsetDateTime;
use uuid::Uuid;

pub const CONFIG_SORT_KEY: &str = "config";
pub const STATE_SORT_KEY: &str = "state";
pub const ORCHESTRATOR_SORT_KEY: &str = "state#orchestrator";
pub const EXCHANGE_SORT_KEY_PREFIX: &str = "exchange#";

pub fn sandbox_partition(sandbox_id: &str) -> String {
    format!("sandbox#{sandbox_id}")
}

pub fn session_partition(session_id: &str) -> String {
    format!("session#{session_id}")
}

pub fn party_sort_key(party_name: &str) -> String {
    format!("state#party#{party_name}")
}

/// Exchanges sort by the time they were recorded.
pub fn exchange_sort_key(recorded_at: OffsetDateTime, exchange_id: Uuid) -> String {
    format!(
        "{EXCHANGE_SORT_KEY_PREFIX}{:020}#{exchange_id}",
        recorded_at.unix_timestamp_nanos()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn exchange_keys_sort_chronologically() {
        let id = Uuid::nil();
        let early = exchange_sort_key(datetime!(2026-01-01 0:00 UTC), id);
        let late = exchange_sort_key(datetime!(2026-01-01 0:00:01 UTC), id);
        assert!(early < late);
        assert!(early.starts_with("exchange#0"));
        assert_eq!(party_sort_key("Sender1"), "state#party#Sender1");
    }
}
