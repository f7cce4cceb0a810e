use std::future::Future;
use std::time::Duration;

use serde_json::json;

use super::{TestResult, LONG_LOCK};
use crate::LockingMap;

pub(super) async fn run_lock_tests<M, F, Fut>(factory: &F) -> Vec<TestResult>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "lock",
        "load_new_item_returns_default",
        load_new_item_returns_default(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "save_then_load_returns_saved_value",
        save_then_load_returns_saved_value(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "save_releases_lock",
        save_releases_lock(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "unlock_releases_lock_without_writing",
        unlock_releases_lock_without_writing(factory).await,
    ));
    results.push(TestResult::from_result(
        "lock",
        "items_lock_independently",
        items_lock_independently(factory).await,
    ));

    results
}

// ── Load of a new item ──────────────────────────────────────────────────────

async fn load_new_item_returns_default<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(LONG_LOCK).await;
    let value = map
        .load("holder-a", "sandbox#1", "state", json!({"fresh": true}))
        .await
        .map_err(|e| format!("load: {e}"))?;
    if value != json!({"fresh": true}) {
        return Err(format!("expected the default value, got {value}"));
    }
    if map
        .peek("sandbox#1", "state")
        .await
        .map_err(|e| format!("peek: {e}"))?
        .is_some()
    {
        return Err("an item that was only loaded must not have a saved value".into());
    }
    Ok(())
}

// ── Save then load ──────────────────────────────────────────────────────────

async fn save_then_load_returns_saved_value<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(LONG_LOCK).await;
    map.load("holder-a", "p", "s", json!(null))
        .await
        .map_err(|e| format!("load: {e}"))?;
    map.save("holder-a", "p", "s", json!({"n": 7}))
        .await
        .map_err(|e| format!("save: {e}"))?;

    let value = map
        .load("holder-b", "p", "s", json!(null))
        .await
        .map_err(|e| format!("second load: {e}"))?;
    if value != json!({"n": 7}) {
        return Err(format!("expected saved value, got {value}"));
    }
    Ok(())
}

// ── Save releases the lock ──────────────────────────────────────────────────

async fn save_releases_lock<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(LONG_LOCK).await;
    map.load("holder-a", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load: {e}"))?;
    map.save("holder-a", "p", "s", json!(1))
        .await
        .map_err(|e| format!("save: {e}"))?;
    map.load("holder-b", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load by another holder after save should succeed: {e}"))?;
    Ok(())
}

// ── Unlock ──────────────────────────────────────────────────────────────────

async fn unlock_releases_lock_without_writing<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(LONG_LOCK).await;
    map.load("holder-a", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load: {e}"))?;
    map.save("holder-a", "p", "s", json!("kept"))
        .await
        .map_err(|e| format!("save: {e}"))?;

    map.load("holder-b", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load b: {e}"))?;
    map.unlock("holder-b", "p", "s")
        .await
        .map_err(|e| format!("unlock: {e}"))?;

    let value = map
        .load("holder-c", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load c after unlock: {e}"))?;
    if value != json!("kept") {
        return Err(format!("unlock must not change the value, got {value}"));
    }
    Ok(())
}

// ── Independent items ───────────────────────────────────────────────────────

async fn items_lock_independently<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(LONG_LOCK).await;
    map.load("holder-a", "session#1", "state#orchestrator", json!({}))
        .await
        .map_err(|e| format!("load orchestrator: {e}"))?;
    map.load("holder-b", "session#1", "state#party#Sender", json!({}))
        .await
        .map_err(|e| format!("a different sort key must not be blocked: {e}"))?;
    map.load("holder-c", "session#2", "state#orchestrator", json!({}))
        .await
        .map_err(|e| format!("a different partition must not be blocked: {e}"))?;
    Ok(())
}
