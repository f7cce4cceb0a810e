use std::future::Future;
use std::time::Duration;

use serde_json::json;

use super::{TestResult, LONG_LOCK};
use crate::{LockingMap, StorageError};

pub(super) async fn run_error_tests<M, F, Fut>(factory: &F) -> Vec<TestResult>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "errors",
        "load_while_locked_returns_item_is_locked",
        load_while_locked_returns_item_is_locked(factory).await,
    ));
    results.push(TestResult::from_result(
        "errors",
        "save_without_load_returns_item_not_locked",
        save_without_load_returns_item_not_locked(factory).await,
    ));
    results.push(TestResult::from_result(
        "errors",
        "save_by_other_holder_returns_item_not_locked",
        save_by_other_holder_returns_item_not_locked(factory).await,
    ));
    results.push(TestResult::from_result(
        "errors",
        "second_save_returns_item_not_locked",
        second_save_returns_item_not_locked(factory).await,
    ));

    results
}

async fn load_while_locked_returns_item_is_locked<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(LONG_LOCK).await;
    map.load("holder-a", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load: {e}"))?;

    match map.load("holder-b", "p", "s", json!(0)).await {
        Err(StorageError::ItemIsLocked { lock_holder, .. }) if lock_holder == "holder-a" => Ok(()),
        Err(StorageError::ItemIsLocked { lock_holder, .. }) => Err(format!(
            "ItemIsLocked should name holder-a, named {lock_holder}"
        )),
        Err(e) => Err(format!("expected ItemIsLocked, got {e}")),
        Ok(_) => Err("expected ItemIsLocked, load succeeded".into()),
    }
}

async fn save_without_load_returns_item_not_locked<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(LONG_LOCK).await;
    match map.save("holder-a", "p", "s", json!(1)).await {
        Err(StorageError::ItemNotLocked { .. }) => Ok(()),
        Err(e) => Err(format!("expected ItemNotLocked, got {e}")),
        Ok(()) => Err("expected ItemNotLocked, save succeeded".into()),
    }
}

async fn save_by_other_holder_returns_item_not_locked<M, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = factory(LONG_LOCK).await;
    map.load("holder-a", "p", "s", json!(0))
        .await
        .map_err(|e| format!("load: {e}"))?;

    match map.save("holder-b", "p", "s", json!(1)).await {
        Err(StorageError::ItemNotLocked { lock_holder, .. }) => {
            if lock_holder.as_deref() != Some("holder-a") {
                return Err(format!(
                    "ItemNotLocked should name holder-a, named {lock_holder:?}"
                ));
            }
        }
        Err(e) => return Err(format!("expected ItemNotLocked, got {e}")),
        Ok(()) => return Err("expected ItemNotLocked, save succeeded".into()),
    }

    // The rightful holder can still save.
    map.save("holder-a", "p", "s", json!(2))
        .await
        .map_err(|e| format!("holder-a save: {e}"))?;
    Ok(())
}

async fn second_save_returns_item_not_locked<M, F, Fut>(factory: &F) -> Result<(), String>
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
        .map_err(|e| format!("first save: {e}"))?;

    match map.save("holder-a", "p", "s", json!(2)).await {
        Err(StorageError::ItemNotLocked { .. }) => Ok(()),
        Err(e) => Err(format!("expected ItemNotLocked, got {e}")),
        Ok(()) => Err("a save must release the lock; the second save succeeded".into()),
    }
}
