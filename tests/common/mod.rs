//! Shared test infrastructure for CLI integration tests.
#![allow(dead_code)]

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

pub const ARTIFACT: &str = "CREATE OR REPLACE FUNCTION calc_total(p_invoice_id NUMBER) RETURN NUMBER IS
  v_total NUMBER;
BEGIN
  SELECT SUM(amount) INTO v_total FROM invoice_lines WHERE invoice_id = p_invoice_id;
  RETURN v_total;
EXCEPTION
  WHEN OTHERS THEN
    RETURN NULL;
END;
";

pub const SUMMARY: &str =
    "calc_total sums amount from invoice_lines for p_invoice_id and returns v_total.";

pub const CLASSIFICATION: &str = r#"{"issues": [
  {"category": "error_handling", "severity": "high", "message": "WHEN OTHERS returns NULL and hides every error from the SELECT."},
  {"category": "logic_correctness", "severity": "medium", "message": "v_total is NULL when invoice_lines has no rows for p_invoice_id."}
]}"#;

pub const ANALYSIS: &str = r#"```json
{
  "summary": "calc_total returns the sum of amount for p_invoice_id.",
  "risks": ["WHEN OTHERS hides errors from the SELECT."],
  "assumptions": ["invoice_lines holds one row per line of an invoice."],
  "suggestions": ["Let NO_DATA_FOUND propagate instead of returning NULL."]
}
```"#;

/// Responses that pass every default step on [`ARTIFACT`].
pub fn good_responses() -> Vec<&'static str> {
    vec![SUMMARY, CLASSIFICATION, ANALYSIS]
}

/// A scratch directory isolated from the user's config and LM settings.
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `text` to `rel`, creating parent directories.
    pub fn write(&self, rel: &str, text: &str) -> PathBuf {
        let path = self.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dir");
        }
        fs::write(&path, text).expect("write file");
        path
    }

    /// Write scripted responses as `rel/001.txt`, `rel/002.txt`, ...
    pub fn responses(&self, rel: &str, responses: &[&str]) -> PathBuf {
        let dir = self.path().join(rel);
        fs::create_dir_all(&dir).expect("create responses dir");
        for (idx, text) in responses.iter().enumerate() {
            fs::write(dir.join(format!("{:03}.txt", idx + 1)), text).expect("write response");
        }
        dir
    }

    pub fn stepgate(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_stepgate"))
            .args(args)
            .current_dir(self.path())
            .env("HOME", self.path())
            .env("XDG_CONFIG_HOME", self.path().join(".config"))
            .env_remove("STEPGATE_LM_COMMAND")
            .env_remove("STEPGATE_LOG")
            .output()
            .expect("run stepgate")
    }

    pub fn read_json(&self, rel: &str) -> Value {
        let path = self.path().join(rel);
        let bytes = fs::read(&path).unwrap_or_else(|err| panic!("read {}: {err}", path.display()));
        serde_json::from_slice(&bytes).expect("parse JSON")
    }
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

/// Exit code, with stderr attached to the panic when the process was killed.
pub fn exit_code(output: &Output) -> i32 {
    output
        .status
        .code()
        .unwrap_or_else(|| panic!("stepgate killed by signal; stderr:\n{}", stderr(output)))
}
