//! CLI integration tests for the `quayside` subcommands.
//!
//! Uses `assert_cmd` to spawn the `quayside` binary and verify
//! exit codes, stdout content, and stderr content.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

/// Helper: create a Command for the `quayside` binary.
fn quayside() -> Command {
    cargo_bin_cmd!("quayside")
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    quayside()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Conformance sandboxes"));
}

#[test]
fn version_exits_0() {
    quayside()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("quayside"));
}

#[test]
fn unknown_subcommand_fails() {
    quayside().arg("frobnicate").assert().failure();
}

// ──────────────────────────────────────────────
// 2. Scenarios
// ──────────────────────────────────────────────

#[test]
fn scenarios_lists_both_modules() {
    quayside()
        .arg("scenarios")
        .assert()
        .success()
        .stdout(predicate::str::contains("PINT 3.0.0"))
        .stdout(predicate::str::contains("Transfer scenarios (19)"))
        .stdout(predicate::str::contains("Receiver validation scenarios (1)"));
}

#[test]
fn scenarios_json_output_is_parseable() {
    let output = quayside()
        .args(["--output", "json", "scenarios"])
        .output()
        .expect("failed to run quayside");
    assert!(output.status.success());
    let modules: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let modules = modules.as_array().expect("array of modules");
    assert_eq!(modules.len(), 2);
    let total: usize = modules
        .iter()
        .map(|m| m["scenarios"].as_array().map_or(0, |s| s.len()))
        .sum();
    assert_eq!(total, 20);
}

// ──────────────────────────────────────────────
// 3. Run
// ──────────────────────────────────────────────

#[test]
fn run_prints_a_report_per_role() {
    quayside()
        .arg("run")
        .assert()
        .success()
        .stdout(predicate::str::contains("== SendingPlatform =="))
        .stdout(predicate::str::contains("== ReceivingPlatform =="))
        .stdout(predicate::str::contains("PINT 3.0.0: "))
        .stdout(predicate::str::contains("NO_TRAFFIC").not());
}

#[test]
fn run_json_digest_for_one_role() {
    let output = quayside()
        .args(["--output", "json", "run", "--parallel", "3", "--role", "ReceivingPlatform"])
        .output()
        .expect("failed to run quayside");
    assert!(output.status.success());
    let reports: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    let reports = reports.as_array().expect("array of reports");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0]["role"], "ReceivingPlatform");
    assert_eq!(reports[0]["digest"]["title"], "PINT 3.0.0");
    assert_eq!(reports[0]["digest"]["modules"].as_array().map(|m| m.len()), Some(2));
}

#[test]
fn run_rejects_zero_parallel() {
    quayside()
        .args(["run", "--parallel", "0"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--parallel"));
}

#[test]
fn run_rejects_unknown_role() {
    quayside()
        .args(["run", "--role", "Carrier"])
        .assert()
        .failure()
        .code(1);
}

// ──────────────────────────────────────────────
// 4. Serve flag validation
// ──────────────────────────────────────────────

#[test]
fn serve_requires_both_tls_flags() {
    quayside()
        .args(["serve", "--tls-cert", "cert.pem"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--tls-key"));
}
