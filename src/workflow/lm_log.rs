//! LM invocation logging for review transparency.
//!
//! Every attempt of every run is appended to `<run dir>/lm_log.jsonl` as one
//! JSON line:
//!
//! ```jsonl
//! {"schema_version":1,"ts":1707900000000,"artifact":"get_invoice.sql","ordinal":1,"step":"summary","duration_ms":4200,"outcome":"accepted",...}
//! ```
//!
//! With content logging enabled, full prompts and responses are stored in
//! `lm_log/<output stem>_<ordinal>_<step>_prompt.txt` and `..._response.txt`.
use super::paths::output_stem;
use crate::artifact::Artifact;
use crate::engine::{AttemptObserver, AttemptRecord};
use crate::util::{now_epoch_ms, preview};
use crate::validate::{RejectionKind, ValidationResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Current schema version for lm_log.jsonl entries.
pub const LM_LOG_SCHEMA_VERSION: u32 = 1;
const PROMPT_PREVIEW_BYTES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LmOutcome {
    Accepted,
    /// The backend answered but the validator rejected the response.
    Rejected,
    /// The backend failed or timed out; no response was validated.
    BackendError,
}

/// A single LM invocation log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmLogEntry {
    pub schema_version: u32,

    /// Unix timestamp in milliseconds when the entry was written.
    pub ts: u128,

    pub run_id: String,
    pub artifact: String,

    /// Audit ordinal of the attempt within its run.
    pub ordinal: u64,
    pub stage: String,
    pub step: String,
    pub attempt: u32,
    pub fallback_depth: usize,
    pub corrective: bool,

    pub duration_ms: u64,
    pub outcome: LmOutcome,

    /// `KIND: detail` of the rejection, when there was one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<String>,

    pub prompt_bytes: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_sha256: Option<String>,

    /// Prompt preview (first ~500 bytes) for quick inspection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_preview: Option<String>,
}

impl LmLogEntry {
    fn from_attempt(
        run_id: &str,
        artifact: &Artifact,
        record: &AttemptRecord,
        prompt: &str,
        elapsed: Duration,
    ) -> Self {
        let (outcome, rejection) = match &record.result {
            ValidationResult::Accepted { .. } => (LmOutcome::Accepted, None),
            ValidationResult::Rejected(rejection) => {
                let outcome = if rejection.kind == RejectionKind::BackendError {
                    LmOutcome::BackendError
                } else {
                    LmOutcome::Rejected
                };
                (outcome, Some(rejection.to_string()))
            }
        };
        Self {
            schema_version: LM_LOG_SCHEMA_VERSION,
            ts: now_epoch_ms().unwrap_or_default(),
            run_id: run_id.to_string(),
            artifact: artifact.name().to_string(),
            ordinal: record.ordinal,
            stage: record.stage.clone(),
            step: record.step_name.clone(),
            attempt: record.attempt_index,
            fallback_depth: record.fallback_depth,
            corrective: record.corrective,
            duration_ms: elapsed.as_millis() as u64,
            outcome,
            rejection,
            prompt_bytes: prompt.len(),
            response_sha256: record.raw_output_hash.clone(),
            prompt_preview: Some(preview(prompt, PROMPT_PREVIEW_BYTES)),
        }
    }
}

/// Attempt observer appending to one run directory's LM log.
///
/// Shared by every run of a batch; appends are serialized so lines never
/// interleave.
pub(crate) struct LmLog {
    run_id: String,
    log_path: PathBuf,
    content_dir: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl LmLog {
    pub(crate) fn new(run_id: &str, log_path: PathBuf, content_dir: Option<PathBuf>) -> Self {
        Self {
            run_id: run_id.to_string(),
            log_path,
            content_dir,
            write_lock: Mutex::new(()),
        }
    }

    fn record(
        &self,
        artifact: &Artifact,
        record: &AttemptRecord,
        prompt: &str,
        elapsed: Duration,
    ) -> Result<()> {
        let entry = LmLogEntry::from_attempt(&self.run_id, artifact, record, prompt, elapsed);
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        append_lm_log(&self.log_path, &entry)?;
        if let Some(dir) = &self.content_dir {
            let name = format!(
                "{}_{:03}_{}",
                output_stem(artifact.name()),
                record.ordinal,
                record.step_name
            );
            store_lm_content(
                dir,
                &name,
                prompt,
                record.raw_output.as_deref().unwrap_or(""),
            )?;
        }
        Ok(())
    }
}

impl AttemptObserver for LmLog {
    fn attempt_finished(
        &self,
        artifact: &Artifact,
        record: &AttemptRecord,
        prompt: &str,
        elapsed: Duration,
    ) {
        if let Err(err) = self.record(artifact, record, prompt, elapsed) {
            tracing::warn!(error = %format!("{err:#}"), "lm log write failed");
        }
    }
}

/// Append an LM log entry to the log file.
pub fn append_lm_log(log_path: &Path, entry: &LmLogEntry) -> Result<()> {
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("create directory for lm_log")?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("open lm_log for append: {}", log_path.display()))?;

    let line = serde_json::to_string(entry).context("serialize lm_log entry")?;
    writeln!(file, "{line}").context("write lm_log entry")?;
    Ok(())
}

/// Store full prompt/response content for one attempt.
pub fn store_lm_content(dir: &Path, name: &str, prompt: &str, response: &str) -> Result<()> {
    fs::create_dir_all(dir).context("create lm_log directory")?;

    let prompt_path = dir.join(format!("{name}_prompt.txt"));
    let response_path = dir.join(format!("{name}_response.txt"));

    fs::write(&prompt_path, prompt)
        .with_context(|| format!("write prompt: {}", prompt_path.display()))?;
    fs::write(&response_path, response)
        .with_context(|| format!("write response: {}", response_path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::StructuredOutput;
    use crate::validate::Rejection;

    fn attempt(ordinal: u64, result: ValidationResult, raw: Option<&str>) -> AttemptRecord {
        AttemptRecord {
            ordinal,
            stage: "summary".to_string(),
            step_index: 0,
            step_name: "summary".to_string(),
            fallback_depth: 0,
            attempt_index: (ordinal - 1) as u32,
            raw_output_hash: raw.map(|raw| crate::util::sha256_hex(raw.as_bytes())),
            raw_output: raw.map(str::to_string),
            corrective: ordinal > 1,
            result,
        }
    }

    fn read_entries(path: &Path) -> Vec<LmLogEntry> {
        std::fs::read_to_string(path)
            .expect("read lm_log")
            .lines()
            .map(|line| serde_json::from_str(line).expect("parse entry"))
            .collect()
    }

    #[test]
    fn observer_appends_one_line_per_attempt() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("lm_log.jsonl");
        let log = LmLog::new("run-1", path.clone(), None);
        let artifact = Artifact::new("get_invoice.sql", "BEGIN NULL; END;");

        let rejected = attempt(
            1,
            ValidationResult::Rejected(Rejection::new(RejectionKind::Schema, "missing `issues`")),
            Some("{}"),
        );
        let failed = attempt(
            2,
            ValidationResult::Rejected(Rejection::new(
                RejectionKind::BackendError,
                "backend timed out after 10ms",
            )),
            None,
        );
        let accepted = attempt(
            3,
            ValidationResult::Accepted {
                output: StructuredOutput::single("text", "ok".to_string()),
            },
            Some("ok"),
        );
        for record in [&rejected, &failed, &accepted] {
            log.attempt_finished(&artifact, record, "PROMPT", Duration::from_millis(7));
        }

        let entries = read_entries(&path);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].outcome, LmOutcome::Rejected);
        assert_eq!(entries[0].rejection.as_deref(), Some("SCHEMA: missing `issues`"));
        assert_eq!(entries[1].outcome, LmOutcome::BackendError);
        assert!(entries[1].response_sha256.is_none());
        assert_eq!(entries[2].outcome, LmOutcome::Accepted);
        assert_eq!(entries[2].duration_ms, 7);
        assert_eq!(entries[2].run_id, "run-1");
        assert!(!dir.path().join("lm_log").exists());
    }

    #[test]
    fn content_files_are_written_when_enabled() {
        let dir = tempfile::tempdir().expect("temp dir");
        let content_dir = dir.path().join("lm_log");
        let log = LmLog::new(
            "run-1",
            dir.path().join("lm_log.jsonl"),
            Some(content_dir.clone()),
        );
        let artifact = Artifact::new("get_invoice.sql", "x");
        let record = attempt(
            1,
            ValidationResult::Accepted {
                output: StructuredOutput::single("text", "fine".to_string()),
            },
            Some("fine"),
        );
        log.attempt_finished(&artifact, &record, "the prompt", Duration::ZERO);

        let prompt = content_dir.join("get_invoice_001_summary_prompt.txt");
        let response = content_dir.join("get_invoice_001_summary_response.txt");
        assert_eq!(std::fs::read_to_string(prompt).expect("prompt"), "the prompt");
        assert_eq!(std::fs::read_to_string(response).expect("response"), "fine");
    }

    #[test]
    fn long_prompts_are_previewed() {
        let artifact = Artifact::new("a.sql", "x");
        let record = attempt(
            1,
            ValidationResult::Accepted {
                output: StructuredOutput::single("text", "y".to_string()),
            },
            Some("y"),
        );
        let prompt = "p".repeat(2000);
        let entry = LmLogEntry::from_attempt("run-1", &artifact, &record, &prompt, Duration::ZERO);
        assert_eq!(entry.prompt_bytes, 2000);
        let preview = entry.prompt_preview.expect("preview");
        assert!(preview.ends_with("...(truncated)"));
        assert!(preview.len() < 600);
    }
}
