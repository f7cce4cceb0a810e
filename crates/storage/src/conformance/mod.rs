//! Conformance test suite for `LockingMap` implementations.
//!
//! This module provides a backend-agnostic test suite that any `LockingMap`
//! implementation can run to verify correctness. The suite covers:
//!
//! - **Lock cycle**: load stamps a lock, save writes and releases, unlock releases
//! - **Lock errors**: `ItemIsLocked`, `ItemNotLocked`, `LockHasExpired`
//! - **Expiry**: an expired lock no longer blocks other holders
//! - **Concurrency**: racing loads have exactly one winner
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a factory function that
//! creates a fresh, empty map for each test. Expiry tests need a short lock
//! duration, so the factory receives the duration to use:
//!
//! ```ignore
//! use quayside_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn dynamo_conformance() {
//!     let report = run_conformance_suite(|lock_duration| async move {
//!         create_test_dynamo_map(lock_duration).await
//!     }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod errors;
mod expiry;
mod lock;

use std::fmt;
use std::future::Future;
use std::time::Duration;

use crate::LockingMap;

/// Lock duration used by tests that never wait for expiry.
const LONG_LOCK: Duration = Duration::from_secs(60);

/// Lock duration used by expiry tests.
const SHORT_LOCK: Duration = Duration::from_millis(80);

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "lock", "errors", "expiry").
    pub category: String,
    /// Test name (e.g. "save_releases_lock").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a locking map backend.
///
/// The `factory` function is called once per test with the lock duration
/// the test needs, and must return a fresh, empty map.
pub async fn run_conformance_suite<M, F, Fut>(factory: F) -> ConformanceReport
where
    M: LockingMap,
    F: Fn(Duration) -> Fut,
    Fut: Future<Output = M>,
{
    let mut results = Vec::new();

    results.extend(lock::run_lock_tests(&factory).await);
    results.extend(errors::run_error_tests(&factory).await);
    results.extend(expiry::run_expiry_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}
