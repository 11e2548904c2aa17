//! End-to-end tests for `stepgate gate` using scripted responses.

mod common;

use common::{exit_code, stderr, stdout, Workspace};

const CI_LOG: &str = "\
SQLcl: Release 23.4
Running deploy_tables.sql
ORA-00942: table or view does not exist
Tests: 41 passed, 1 failed (test_invoice_totals)
";

const BLOCK: &str = r#"{"deploy_ok": "false", "severity": "high",
  "reasons": ["ORA-00942 while running deploy_tables.sql", "test_invoice_totals failed"]}"#;

const APPROVE: &str = r#"{"deploy_ok": "true", "severity": "low", "reasons": []}"#;

fn gate(ws: &Workspace, responses: &str) -> std::process::Output {
    ws.stepgate(&[
        "gate",
        "--log",
        "ci/sqlcl.log",
        "--responses",
        responses,
        "--out",
        "ci",
        "--run-id",
        "g1",
    ])
}

#[test]
fn failing_log_blocks_the_deploy() {
    let ws = Workspace::new();
    ws.write("ci/sqlcl.log", CI_LOG);
    ws.responses("responses", &[BLOCK]);

    let output = gate(&ws, "responses");
    assert_eq!(exit_code(&output), 1, "stderr:\n{}", stderr(&output));
    assert!(stdout(&output).contains("gate: deploy_ok=false, severity=high"));
    assert!(stdout(&output).contains("- test_invoice_totals failed"));
    assert!(stderr(&output).contains("BLOCKING DEPLOY"));

    let verdict = ws.read_json("ci/g1/ai-ci-gate.json");
    assert_eq!(verdict["deploy_ok"], false);
    assert_eq!(verdict["run_id"], "g1");
    assert_eq!(verdict["reasons"].as_array().map(Vec::len), Some(2));
    let result = ws.read_json("ci/g1/sqlcl.run.json");
    assert_eq!(result["status"], "COMPLETED");
    assert!(!ws.path().join("ci/g1/sqlcl.review.md").exists());
}

#[test]
fn clean_log_allows_the_deploy() {
    let ws = Workspace::new();
    ws.write("ci/sqlcl.log", CI_LOG);
    ws.responses("responses", &[APPROVE]);

    let output = gate(&ws, "responses");
    assert_eq!(exit_code(&output), 0, "stderr:\n{}", stderr(&output));
    assert!(stdout(&output).contains("gate: OK to deploy"));
    assert_eq!(ws.read_json("ci/g1/ai-ci-gate.json")["deploy_ok"], true);
}

#[test]
fn rejected_decision_blocks_the_deploy() {
    let ws = Workspace::new();
    ws.write("ci/sqlcl.log", CI_LOG);
    let invented = r#"{"deploy_ok": "true", "severity": "low", "reasons": ["rollback_users.sql is clean"]}"#;
    ws.responses("responses", &[invented, invented, invented]);

    let output = gate(&ws, "responses");
    assert_eq!(exit_code(&output), 1, "stderr:\n{}", stderr(&output));
    let verdict = ws.read_json("ci/g1/ai-ci-gate.json");
    assert_eq!(verdict["deploy_ok"], false);
    assert_eq!(verdict["status"], "FAILED");
    assert_eq!(verdict["severity"], "unknown");
}

#[test]
fn gate_catalog_is_printable_and_checks_clean() {
    let ws = Workspace::new();
    let output = ws.stepgate(&["catalog", "--gate"]);
    assert_eq!(exit_code(&output), 0);
    let catalog: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("catalog JSON");
    assert_eq!(catalog["pipeline"][0], "gate");

    let output = ws.stepgate(&["check", "--gate"]);
    assert_eq!(exit_code(&output), 0, "stderr:\n{}", stderr(&output));
    assert!(stdout(&output).contains("built-in gate"));
}
