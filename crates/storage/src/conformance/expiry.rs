use std::future::Future;
use std::time::Duration;

use serde_json::json;

use super::{TestResult, SHORT_LOCK};
use crate::{LockingMap, StorageError};

pub(super) async fn run_expiry_tests<M, F, Fut>(factory: &F) -> Vec<TestResult>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "expiry",
        "expired_lock_allows_other_holder",
        expired_lock_allows_other_holder(factory).await,
    ));
    results.push(TestResult::from_result(
        "expiry",
        "save_after_expiry_returns_lock_has_expired",
        save_after_expiry_returns_lock_has_expired(factory).await,
    ));
    results.push(TestResult::from_result(
        "expiry",
        "stale_holder_cannot_save_over_new_holder",
        stale_holder_cannot_save_over_new_holder(factory).await,
    ));

    results
}

async fn wait_for_expiry() {
    tokio::time::sleep(SHORT_LOCK + Duration::from_millis(40)).await;
}

async fn expired_lock_allows_other_holder<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(SHORT_LOCK).await;
    map.load("holder-a", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load: {e}"))?;
    wait_for_expiry().await;
    map.load("holder-b", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load after expiry should succeed: {e}"))?;
    Ok(())
}

async fn save_after_expiry_returns_lock_has_expired<M, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(SHORT_LOCK).await;
    map.load("holder-a", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load: {e}"))?;
    wait_for_expiry().await;

    match map.save("holder-a", "p", "s", json!(1)).await {
        Err(StorageError::LockHasExpired { .. }) => {}
        Err(e) => return Err(format!("expected LockHasExpired, got {e}")),
        Ok(()) => return Err("expected LockHasExpired, save succeeded".into()),
    }
    if map
        .peek("p", "s")
        .await
        .map_err(|e| format!("peek: {e}"))?
        .is_some()
    {
        return Err("a rejected save must not write".into());
    }
    Ok(())
}

/// After holder A's lock expires and holder B takes the item, A's late save
/// is rejected as ItemNotLocked and B's save goes through.
async fn stale_holder_cannot_save_over_new_holder<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(SHORT_LOCK).await;
    map.load("holder-a", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load a: {e}"))?;
    wait_for_expiry().await;
    map.load("holder-b", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load b: {e}"))?;

    match map.save("holder-a", "p", "s", json!("from-a")).await {
        Err(StorageError::ItemNotLocked { .. }) => {}
        Err(e) => return Err(format!("expected ItemNotLocked for stale holder, got {e}")),
        Ok(()) => return Err("stale holder save succeeded".into()),
    }
    map.save("holder-b", "p", "s", json!("from-b"))
        .await
        .map_err(|e| format!("save b: {e}"))?;

    let value = map
        .peek("p", "s")
        .await
        .map_err(|e| format!("peek: {e}"))?;
    if value != Some(json!("from-b")) {
        return Err(format!("expected value from holder-b, got {value:?}"));
    }
    Ok(())
}
