//! Folding a finished run into its consumer-facing result.
//!
//! `assemble` is the only bridge between the engine and everything that
//! renders or persists results. The digest, Markdown and batch summary are
//! all computed from a `RunResult`, so a result loaded from disk renders the
//! same way as a fresh one.
use crate::artifact::ArtifactId;
use crate::engine::{AttemptRecord, ExecutionContext, RunFailure, RunStatus, StepOutcome};
use crate::output::StructuredOutput;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

mod digest;
mod gate;
mod markdown;
mod summary;

pub use digest::{Issue, ReviewDigest, Severity};
pub use gate::GateVerdict;
pub use markdown::render_review;
pub use summary::{aggregate, write_summary, FailedFile, FileReview};

/// Current schema version for serialized run results.
pub const RUN_RESULT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResult {
    pub schema_version: u32,
    pub artifact: ArtifactId,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    /// One outcome per pipeline position, in pipeline order.
    pub steps: Vec<StepOutcome>,
    pub accepted: BTreeMap<String, StructuredOutput>,
    pub audit_trail: Vec<AttemptRecord>,
}

impl RunResult {
    pub fn load(path: &Path) -> Result<Self> {
        let bytes =
            fs::read(path).with_context(|| format!("read run result {}", path.display()))?;
        let result: Self = serde_json::from_slice(&bytes)
            .with_context(|| format!("parse run result {}", path.display()))?;
        if result.schema_version != RUN_RESULT_SCHEMA_VERSION {
            return Err(anyhow!(
                "unsupported run result schema_version {} in {}",
                result.schema_version,
                path.display()
            ));
        }
        Ok(result)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("serialize run result")?;
        fs::write(path, text.as_bytes())
            .with_context(|| format!("write run result {}", path.display()))
    }

    #[cfg(test)]
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|outcome| outcome.step == step)
    }

    /// One line naming what went wrong, for terminal output.
    pub fn failure_summary(&self) -> Option<String> {
        self.failure
            .as_ref()
            .map(|failure| format!("{}: {failure}", self.artifact.name))
    }
}

/// Fold a finished context into its result. Pure; the context is untouched.
pub fn assemble(ctx: &ExecutionContext) -> RunResult {
    RunResult {
        schema_version: RUN_RESULT_SCHEMA_VERSION,
        artifact: ctx.artifact().id().clone(),
        status: ctx.status(),
        failure: ctx.failure().cloned(),
        steps: ctx.outcomes().to_vec(),
        accepted: ctx.accepted().clone(),
        audit_trail: ctx.audit().records().to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::catalog::{Pipeline, Selection, StepCatalog};
    use crate::engine::{CancelToken, EngineSettings, Orchestrator, StepState};
    use crate::invoker::ScriptedInvoker;
    use crate::prompts::PromptTemplates;
    use crate::validate::Validator;
    use std::sync::Arc;

    fn catalog() -> StepCatalog {
        serde_json::from_value(serde_json::json!({
            "schema_version": 1,
            "vocabulary": {"uncertainty_marker": "UNKNOWN"},
            "steps": [
                {"name": "summary", "prompt_template": "t",
                 "output_schema": {"format": "text", "grounded": true},
                 "max_retries": 1},
                {"name": "notes", "prompt_template": "t",
                 "output_schema": {"format": "text"}, "criticality": "optional"}
            ]
        }))
        .expect("catalog")
    }

    fn run(responses: &[&str]) -> RunResult {
        let catalog = catalog();
        let mut templates = PromptTemplates::default();
        templates.insert("t", "{code}");
        let pipeline =
            Pipeline::build(&catalog, &templates, &Selection::default()).expect("pipeline");
        let validator = Validator::new(catalog.vocabulary.clone());
        let invoker = Arc::new(ScriptedInvoker::new(responses.iter().copied()));
        let orchestrator =
            Orchestrator::new(&pipeline, &validator, invoker, EngineSettings::default());
        let ctx = orchestrator.run(
            Artifact::new("calc.sql", "FUNCTION calc_total(p_invoice_id NUMBER)"),
            &CancelToken::new(),
        );
        assemble(&ctx)
    }

    #[test]
    fn assemble_carries_every_attempt_and_outcome() {
        let result = run(&["uses orders_table", "computes calc_total", "ok"]);
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.audit_trail.len(), 3);
        assert_eq!(result.steps.len(), 2);
        assert_eq!(
            result.outcome("summary").map(|outcome| outcome.attempts),
            Some(2)
        );
        assert!(result.accepted.contains_key("notes"));
        assert!(result.failure_summary().is_none());
    }

    #[test]
    fn failed_run_keeps_partial_results_and_names_the_step() {
        let result = run(&["uses orders_table", "uses invoices_table"]);
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.accepted.is_empty());
        assert_eq!(
            result.outcome("notes").map(|outcome| outcome.state),
            Some(StepState::Pending)
        );
        let summary = result.failure_summary().expect("failure summary");
        assert!(summary.starts_with("calc.sql: required step `summary`"));
        assert!(summary.contains("UNGROUNDED"));
    }

    #[test]
    fn written_result_loads_back() {
        let result = run(&["computes calc_total", "ok"]);
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("calc.run.json");
        result.write(&path).expect("write");
        assert_eq!(RunResult::load(&path).expect("load"), result);
    }

    #[test]
    fn load_rejects_unknown_schema_version() {
        let mut result = run(&["computes calc_total", "ok"]);
        result.schema_version = 9;
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("calc.run.json");
        result.write(&path).expect("write");
        let err = RunResult::load(&path).expect_err("version mismatch");
        assert!(err.to_string().contains("schema_version 9"));
    }
}
