//! Per-artifact run log and the append-only run index.
//!
//! The run log captures what went in (input hash, backend, flags), how each
//! step ended, and every file written with its SHA-256, so a review can be
//! traced from Git or CI without reading the full audit trail.
use crate::engine::StepState;
use crate::report::RunResult;
use crate::util::{display_path, sha256_hex};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Current schema version for `<stem>.runlog.json`.
pub const RUNLOG_SCHEMA_VERSION: u32 = 1;

/// Switches that shaped a run, recorded verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunFlags {
    pub markdown: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enable: Vec<String>,
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_budget_secs: Option<u64>,
    pub store_raw_output: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogStep {
    pub name: String,
    pub status: StepState,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLogOutput {
    /// Logical type, e.g. `run_result`, `markdown_report`, `refactor_sql`.
    pub kind: String,
    pub path: String,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLog {
    pub version: u32,
    pub run_id: String,
    pub started_at_ms: u128,
    pub input_file: String,
    pub input_sha256: String,
    pub backend: String,
    pub flags: RunFlags,
    pub steps: Vec<RunLogStep>,
    pub outputs: Vec<RunLogOutput>,
}

impl RunLog {
    pub fn new(
        run_id: &str,
        started_at_ms: u128,
        input_file: &Path,
        backend: String,
        flags: RunFlags,
        result: &RunResult,
    ) -> Self {
        Self {
            version: RUNLOG_SCHEMA_VERSION,
            run_id: run_id.to_string(),
            started_at_ms,
            input_file: input_file.display().to_string(),
            input_sha256: result.artifact.sha256.clone(),
            backend,
            flags,
            steps: result
                .steps
                .iter()
                .map(|outcome| RunLogStep {
                    name: outcome.step.clone(),
                    status: outcome.state,
                    attempts: outcome.attempts,
                    accepted_by: outcome.accepted_by.clone(),
                })
                .collect(),
            outputs: Vec::new(),
        }
    }

    /// Register a written file; `content` is what was written to `path`.
    pub fn add_output(&mut self, kind: &str, path: &Path, base: &Path, content: &[u8]) {
        self.outputs.push(RunLogOutput {
            kind: kind.to_string(),
            path: display_path(path, Some(base)),
            sha256: sha256_hex(content),
        });
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serialize run log")?;
        fs::write(path, text.as_bytes())
            .with_context(|| format!("write run log {}", path.display()))
    }
}

/// One line of `index.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub run_id: String,
    pub artifact: String,
    pub sha256: String,
    pub status: crate::engine::RunStatus,
    pub risk_score: u32,
    pub runlog: String,
}

/// Append-only index shared by every run writing into one run directory.
pub(crate) struct RunIndex {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl RunIndex {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
        }
    }

    pub(crate) fn append(&self, entry: &IndexEntry) -> Result<()> {
        let line = serde_json::to_string(entry).context("serialize index entry")?;
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open index for append: {}", self.path.display()))?;
        writeln!(file, "{line}").context("write index entry")?;
        Ok(())
    }
}
