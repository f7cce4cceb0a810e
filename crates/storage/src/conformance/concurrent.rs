use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use super::{TestResult, LONG_LOCK};
use crate::{LockingMap, StorageError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<M, F, Fut>(factory: &F) -> Vec<TestResult>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_loads_exactly_one_wins",
        concurrent_loads_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_loads_different_items_all_succeed",
        concurrent_loads_different_items_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "serialized_increments_are_not_lost",
        serialized_increments_are_not_lost(factory).await,
    ));

    results
}

// ── Concurrent load: exactly one wins ───────────────────────────────────────

/// N tasks with distinct holder ids race to load the same item. Exactly one
/// gets the lock; the rest must get ItemIsLocked.
async fn concurrent_loads_exactly_one_wins<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = Arc::new(factory(LONG_LOCK).await);

    let mut handles = Vec::new();
    for i in 0..N {
        let m = map.clone();
        handles.push(tokio::spawn(async move {
            match m.load(&format!("holder-{i}"), "p", "s", json!(0)).await {
                Ok(_) => Ok(true),
                Err(StorageError::ItemIsLocked { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = 0usize;
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        if won {
            winners += 1;
        } else {
            losers += 1;
        }
    }

    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    Ok(())
}

// ── Concurrent loads of different items: all succeed ────────────────────────

async fn concurrent_loads_different_items_all_succeed<M, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = Arc::new(factory(LONG_LOCK).await);

    let mut handles = Vec::new();
    for i in 0..N {
        let m = map.clone();
        handles.push(tokio::spawn(async move {
            let sort_key = format!("state#party#{i}");
            m.load(&format!("holder-{i}"), "session#1", &sort_key, json!(0))
                .await?;
            m.save(&format!("holder-{i}"), "session#1", &sort_key, json!(i))
                .await
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("no contention expected, got: {e}"))?;
    }
    Ok(())
}

// ── Lock-protected read-modify-write ────────────────────────────────────────

/// N tasks each increment a counter under the lock, retrying on contention.
/// The final value must be N: no update is lost.
async fn serialized_increments_are_not_lost<M, F, Fut>(factory: &F) -> Result<(), String>
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let map = Arc::new(factory(LONG_LOCK).await);

    let mut handles = Vec::new();
    for i in 0..N {
        let m = map.clone();
        handles.push(tokio::spawn(async move {
            let holder = format!("holder-{i}");
            for _ in 0..500 {
                match m.load(&holder, "p", "counter", json!(0)).await {
                    Ok(value) => {
                        let next = value.as_u64().unwrap_or(0) + 1;
                        return m.save(&holder, "p", "counter", json!(next)).await;
                    }
                    Err(StorageError::ItemIsLocked { .. }) => {
                        tokio::time::sleep(Duration::from_millis(2)).await;
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(StorageError::Backend("gave up waiting for the lock".into()))
        }));
    }

    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("increment failed: {e}"))?;
    }

    let value = map
        .peek("p", "counter")
        .await
        .map_err(|e| format!("peek: {e}"))?;
    if value != Some(json!(N)) {
        return Err(format!("expected counter {N}, got {value:?}"));
    }
    Ok(())
}
