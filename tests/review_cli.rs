//! End-to-end tests for the `stepgate` binary using scripted responses.

mod common;

use common::{exit_code, good_responses, stderr, stdout, Workspace, ARTIFACT};

#[test]
fn run_completes_and_writes_outputs() {
    let ws = Workspace::new();
    ws.write("src/calc_total.sql", ARTIFACT);
    ws.responses("responses", &good_responses());

    let output = ws.stepgate(&[
        "run",
        "--artifact",
        "src/calc_total.sql",
        "--responses",
        "responses",
        "--out",
        "reviews",
        "--run-id",
        "r1",
    ]);
    assert_eq!(exit_code(&output), 0, "stderr:\n{}", stderr(&output));

    let result = ws.read_json("reviews/r1/calc_total.run.json");
    assert_eq!(result["status"], "COMPLETED");
    assert_eq!(result["artifact"]["name"], "calc_total.sql");
    assert_eq!(result["steps"][3]["state"], "SKIPPED");
    assert_eq!(result["audit_trail"].as_array().map(Vec::len), Some(3));

    let review = std::fs::read_to_string(ws.path().join("reviews/r1/calc_total.review.md"))
        .expect("read review");
    assert!(review.starts_with("# Code Review: calc_total.sql"));
    assert!(review.contains("WHEN OTHERS returns NULL"));
    assert!(review.contains("Review: WHEN OTHERS hides errors from the SELECT."));

    let runlog = ws.read_json("reviews/r1/calc_total.runlog.json");
    let kinds: Vec<&str> = runlog["outputs"]
        .as_array()
        .expect("outputs")
        .iter()
        .filter_map(|entry| entry["kind"].as_str())
        .collect();
    assert_eq!(kinds, vec!["run_result", "markdown_report"]);

    let lm_log = std::fs::read_to_string(ws.path().join("reviews/r1/lm_log.jsonl"))
        .expect("read lm log");
    assert_eq!(lm_log.lines().count(), 3);
    let index = std::fs::read_to_string(ws.path().join("reviews/r1/index.jsonl"))
        .expect("read index");
    assert!(index.contains("\"risk_score\":35"), "{index}");
}

#[test]
fn failed_required_step_exits_one_and_keeps_result() {
    let ws = Workspace::new();
    ws.write("calc_total.sql", ARTIFACT);
    ws.responses("responses", &["ghost_proc totals the invoice."]);

    let output = ws.stepgate(&[
        "run",
        "--artifact",
        "calc_total.sql",
        "--responses",
        "responses",
        "--run-id",
        "r1",
    ]);
    assert_eq!(exit_code(&output), 1, "stderr:\n{}", stderr(&output));
    assert!(stderr(&output).contains("required step `summary` failed"));

    let result = ws.read_json("reviews/r1/calc_total.run.json");
    assert_eq!(result["status"], "FAILED");
    assert_eq!(result["failure"]["kind"], "step_failed");
    assert_eq!(result["failure"]["step"], "summary");
    assert_eq!(result["audit_trail"][0]["result"]["kind"], "UNGROUNDED");
    assert_eq!(result["steps"][1]["state"], "PENDING");
}

#[test]
fn dry_run_prints_prompts_and_writes_nothing() {
    let ws = Workspace::new();
    ws.write("calc_total.sql", ARTIFACT);

    let output = ws.stepgate(&["run", "--artifact", "calc_total.sql", "--dry-run"]);
    assert_eq!(exit_code(&output), 0, "stderr:\n{}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("[dry-run] summary prompt"));
    assert!(text.contains("[dry-run] refactor: skipped"));
    assert!(text.contains("No LM calls were made"));
    assert!(!ws.path().join("reviews").exists());
}

#[test]
fn run_without_backend_is_an_error() {
    let ws = Workspace::new();
    ws.write("calc_total.sql", ARTIFACT);

    let output = ws.stepgate(&["run", "--artifact", "calc_total.sql"]);
    assert_eq!(exit_code(&output), 2);
    assert!(stderr(&output).contains("no LM command"));
}

#[test]
fn missing_artifact_is_an_error() {
    let ws = Workspace::new();
    let output = ws.stepgate(&["run", "--artifact", "absent.sql", "--dry-run"]);
    assert_eq!(exit_code(&output), 2);
    assert!(stderr(&output).contains("absent.sql"));
}

#[test]
fn batch_reviews_each_file_and_writes_summary() {
    let ws = Workspace::new();
    ws.write("db/calc_total.sql", ARTIFACT);
    ws.write("db/pkg/calc_total.pkb", ARTIFACT);
    ws.write("db/README.md", "not reviewed");
    ws.responses("responses/calc_total", &good_responses());
    ws.responses("responses/pkg__calc_total", &good_responses());

    let output = ws.stepgate(&[
        "batch",
        "--path",
        "db",
        "--responses",
        "responses",
        "--jobs",
        "1",
        "--run-id",
        "b1",
    ]);
    assert_eq!(exit_code(&output), 0, "stderr:\n{}", stderr(&output));

    let summary = ws.read_json("reviews/b1/summary.json");
    assert_eq!(summary["scanned_files"], 2);
    assert_eq!(summary["overall_risk_score"], 35);
    assert_eq!(summary["red_flags"].as_array().map(Vec::len), Some(2));
    assert!(summary["failed"].as_array().expect("failed").is_empty());
    assert!(ws.path().join("reviews/b1/calc_total.run.json").is_file());
    assert!(ws.path().join("reviews/b1/pkg__calc_total.run.json").is_file());
    assert!(ws.path().join("reviews/b1/summary.md").is_file());
}

#[test]
fn batch_risk_gate_exits_three() {
    let ws = Workspace::new();
    ws.write("db/calc_total.sql", ARTIFACT);
    ws.responses("responses/calc_total", &good_responses());

    let output = ws.stepgate(&[
        "batch",
        "--path",
        "db",
        "--responses",
        "responses",
        "--max-risk",
        "10",
        "--run-id",
        "b1",
    ]);
    assert_eq!(exit_code(&output), 3, "stderr:\n{}", stderr(&output));
    assert!(stderr(&output).contains("exceeds --max-risk 10"));
}

#[test]
fn batch_failure_takes_precedence_over_risk_gate() {
    let ws = Workspace::new();
    ws.write("db/calc_total.sql", ARTIFACT);
    ws.write("db/other.sql", ARTIFACT);
    ws.responses("responses/calc_total", &good_responses());
    ws.responses("responses/other", &["ghost_proc totals the invoice."]);

    let output = ws.stepgate(&[
        "batch",
        "--path",
        "db",
        "--responses",
        "responses",
        "--max-risk",
        "10",
        "--run-id",
        "b1",
    ]);
    assert_eq!(exit_code(&output), 1, "stderr:\n{}", stderr(&output));
    let summary = ws.read_json("reviews/b1/summary.json");
    assert_eq!(summary["failed"][0]["path"], "other.sql");
}

#[test]
fn replay_reproduces_a_recorded_run() {
    let ws = Workspace::new();
    ws.write("calc_total.sql", ARTIFACT);
    ws.responses("responses", &good_responses());
    let run = ws.stepgate(&[
        "run",
        "--artifact",
        "calc_total.sql",
        "--responses",
        "responses",
        "--run-id",
        "r1",
    ]);
    assert_eq!(exit_code(&run), 0, "stderr:\n{}", stderr(&run));

    let replay = ws.stepgate(&[
        "replay",
        "--run-result",
        "reviews/r1/calc_total.run.json",
        "--artifact",
        "calc_total.sql",
    ]);
    assert_eq!(exit_code(&replay), 0, "stderr:\n{}", stderr(&replay));
    assert!(stderr(&replay).contains("3 attempt(s) replayed"));

    ws.write("edited.sql", "BEGIN NULL; END;");
    let mismatch = ws.stepgate(&[
        "replay",
        "--run-result",
        "reviews/r1/calc_total.run.json",
        "--artifact",
        "edited.sql",
    ]);
    assert_eq!(exit_code(&mismatch), 1);
}

#[test]
fn check_accepts_builtin_catalog() {
    let ws = Workspace::new();
    let output = ws.stepgate(&["check"]);
    assert_eq!(exit_code(&output), 0, "stderr:\n{}", stderr(&output));
    assert!(stdout(&output).contains("check: ok"));
}

#[test]
fn check_reports_catalog_problems() {
    let ws = Workspace::new();
    ws.write(
        "catalog.json",
        r#"{
  "schema_version": 1,
  "steps": [
    {
      "name": "summary",
      "prompt_template": "summary",
      "output_schema": {"format": "text"},
      "fallback": "missing"
    }
  ]
}"#,
    );
    let output = ws.stepgate(&["check", "--catalog", "catalog.json"]);
    assert_eq!(exit_code(&output), 1);
    assert!(stderr(&output).contains("falls back to unknown step `missing`"));
}

#[test]
fn catalog_prints_builtin_steps_and_config_stub() {
    let ws = Workspace::new();
    let output = ws.stepgate(&["catalog"]);
    assert_eq!(exit_code(&output), 0);
    let catalog: serde_json::Value =
        serde_json::from_str(&stdout(&output)).expect("catalog JSON");
    assert_eq!(catalog["pipeline"][0], "summary");

    let output = ws.stepgate(&["catalog", "--config-stub"]);
    assert_eq!(exit_code(&output), 0);
    let config: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("config JSON");
    assert_eq!(config["schema_version"], 1);
    assert_eq!(config["timeout_secs"], 120);
}
