//! End-to-end tests for the `safebox` binary.
//!
//! Scenario files are written to temporary directories and the binary is
//! run as a subprocess. Reports are read back from stdout or the output
//! file and checked as JSON.

use serde_json::Value;
use std::path::Path;
use std::process::{Command, Output};

fn safebox(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_safebox"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to spawn safebox")
}

fn write_scenario(dir: &Path, body: &str) -> String {
    let path = dir.join("scenario.json");
    std::fs::write(&path, body).unwrap();
    path.to_string_lossy().into_owned()
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[test]
fn bundled_upgrade_scenario_succeeds() {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("scenarios/upgrade.json");
    let out = safebox(&["run", "--scenario", path.to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let report: Value = serde_json::from_slice(&out.stdout).unwrap();
    let steps = report["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 16);

    // Balance read through V2 after the upgrade.
    assert_eq!(steps[11]["output"]["result"]["value"], 1998);
    // Harvest pays 2 (V1 deposit) + 4 (V2 deposit).
    assert_eq!(steps[14]["output"]["result"]["value"]["amount"], 6);
    assert_eq!(steps[15]["output"]["amount"], 6);
    assert!(steps[8]["error"].as_str().unwrap().starts_with("NOT owner!"));
}

#[test]
fn report_can_be_written_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(
        dir.path(),
        r#"{
            "actors": ["owner"],
            "steps": [
                { "op": "deploy_safe", "as": "owner", "name": "vault" },
                { "op": "call", "as": "owner", "target": "vault", "call": { "call": "owner" } }
            ]
        }"#,
    );
    let report_path = dir.path().join("report.json");

    let out = safebox(&["run", "-s", &scenario, "-o", report_path.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(out.stdout.is_empty());

    let report: Value = serde_json::from_str(&std::fs::read_to_string(&report_path).unwrap()).unwrap();
    assert_eq!(
        report["steps"][1]["output"]["result"]["value"],
        report["addresses"]["owner"]
    );
}

#[test]
fn failing_step_exits_nonzero() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(
        dir.path(),
        r#"{
            "actors": ["owner", "intruder"],
            "steps": [
                { "op": "deploy_implementation", "as": "owner", "name": "v1", "version": "v1" },
                { "op": "deploy_proxy", "as": "owner", "name": "vault", "implementation": "v1" },
                { "op": "upgrade_to", "as": "intruder", "proxy": "vault", "target": "v1" }
            ]
        }"#,
    );

    let out = safebox(&["run", "--scenario", &scenario]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("NOT owner!"), "stderr: {stderr}");
}

#[test]
fn malformed_scenario_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let scenario = write_scenario(dir.path(), "{ not json");
    let out = safebox(&["run", "--scenario", &scenario]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("failed to parse scenario"));
}

// ---------------------------------------------------------------------------
// fees / version
// ---------------------------------------------------------------------------

#[test]
fn fees_quotes_each_generation() {
    let out = safebox(&["fees", "--amount", "2000"]);
    assert!(out.status.success());
    let quote: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(quote["fee"], 2);
    assert_eq!(quote["net"], 1998);

    let out = safebox(&["fees", "--amount", "500", "--generation", "v2"]);
    let quote: Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(quote["implementation"], "SafeUpgradeable_v2");
    assert_eq!(quote["fee"], 2);
    assert_eq!(quote["net"], 498);
}

#[test]
fn fees_rejects_zero() {
    let out = safebox(&["fees", "--amount", "0"]);
    assert!(!out.status.success());
}

#[test]
fn version_prints_package_version() {
    let out = safebox(&["version"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}
