//! Deploy verdict folded from a gate run.
//!
//! The verdict blocks unless the run completed and its decision field reads
//! exactly `true`. An uncertain, missing, or rejected decision never lets a
//! deploy through.
use super::RunResult;
use crate::engine::RunStatus;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Current schema version for `ai-ci-gate.json`.
pub const GATE_SCHEMA_VERSION: u32 = 1;

const DEPLOY_OK_FIELD: &str = "deploy_ok";
const REASONS_FIELD: &str = "reasons";
const SEVERITY_FIELD: &str = "severity";
const UNKNOWN_SEVERITY: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateVerdict {
    pub schema_version: u32,
    pub run_id: String,
    /// Name of the reviewed log.
    pub log: String,
    pub status: RunStatus,
    pub deploy_ok: bool,
    pub severity: String,
    pub reasons: Vec<String>,
    pub timestamp_epoch_ms: u128,
}

impl GateVerdict {
    pub fn from_result(run_id: &str, result: &RunResult, timestamp_epoch_ms: u128) -> Self {
        let decision = result
            .accepted
            .values()
            .find(|output| output.get(DEPLOY_OK_FIELD).is_some());
        let (approved, severity, mut reasons) = match decision {
            Some(output) => (
                output.text(DEPLOY_OK_FIELD) == Some("true"),
                output
                    .text(SEVERITY_FIELD)
                    .unwrap_or(UNKNOWN_SEVERITY)
                    .to_string(),
                output
                    .list(REASONS_FIELD)
                    .map(<[String]>::to_vec)
                    .unwrap_or_default(),
            ),
            None => (false, UNKNOWN_SEVERITY.to_string(), Vec::new()),
        };
        match (&result.failure, decision) {
            (Some(failure), _) => reasons.push(format!("gate run failed: {failure}")),
            (None, None) => reasons.push("no step produced a deploy decision".to_string()),
            (None, Some(_)) => {}
        }

        Self {
            schema_version: GATE_SCHEMA_VERSION,
            run_id: run_id.to_string(),
            log: result.artifact.name.clone(),
            status: result.status,
            deploy_ok: approved && result.status == RunStatus::Completed,
            severity,
            reasons,
            timestamp_epoch_ms,
        }
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serialize gate verdict")?;
        fs::write(path, text.as_bytes())
            .with_context(|| format!("write gate verdict {}", path.display()))
    }
}
