//! One artifact through the pipeline, plus everything written about it.
use super::paths::RunPaths;
use super::runlog::{IndexEntry, RunIndex, RunLog};
use super::setup::ReviewSetup;
use crate::artifact::Artifact;
use crate::engine::{AttemptObserver, CancelToken, Orchestrator, StepOutcome, StepState};
use crate::invoker::ModelInvoker;
use crate::prompts::{compose_prompt, ContextSection};
use crate::report::{assemble, render_review, ReviewDigest, RunResult};
use crate::util::{display_path, now_epoch_ms};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Where a run's files go and who else is listening.
pub(crate) struct ReviewSink<'a> {
    pub(crate) run_id: &'a str,
    pub(crate) paths: &'a RunPaths,
    pub(crate) index: &'a RunIndex,
    pub(crate) observers: &'a [Arc<dyn AttemptObserver>],
    pub(crate) markdown: bool,
}

/// Prints one progress line per finished step.
pub(crate) struct Progress;

impl AttemptObserver for Progress {
    fn step_finished(&self, artifact: &Artifact, outcome: &StepOutcome) {
        match outcome.state {
            StepState::Skipped | StepState::Pending => {}
            state => eprintln!(
                "review: {}: {} {} ({} attempt(s){})",
                artifact.name(),
                outcome.step,
                state,
                outcome.attempts,
                match (&outcome.accepted_by, outcome.fallbacks_used) {
                    (Some(by), used) if used > 0 => format!(", via fallback `{by}`"),
                    _ => String::new(),
                }
            ),
        }
    }
}

/// Run the pipeline on `artifact` and persist the result under `stem`.
///
/// The run result is written before anything else so a failure while
/// rendering or indexing never loses it.
pub(crate) fn review_artifact(
    setup: &ReviewSetup,
    artifact: Artifact,
    source: &Path,
    stem: &str,
    invoker: Arc<dyn ModelInvoker>,
    cancel: &CancelToken,
    sink: &ReviewSink<'_>,
) -> Result<(RunResult, ReviewDigest)> {
    let started_at_ms = now_epoch_ms()?;
    let backend = invoker.describe();
    let mut orchestrator = Orchestrator::new(
        &setup.pipeline,
        &setup.validator,
        invoker,
        setup.settings.clone(),
    )
    .with_limit(setup.limit.clone());
    for observer in sink.observers {
        orchestrator = orchestrator.with_observer(Arc::clone(observer));
    }

    let ctx = orchestrator.run(artifact, cancel);
    let result = assemble(&ctx);
    let digest = ReviewDigest::from_result(&result);
    let base = sink.paths.run_dir();
    let flags = setup.flags(sink.markdown);
    let mut runlog = RunLog::new(sink.run_id, started_at_ms, source, backend, flags, &result);

    let result_path = sink.paths.run_result_path(stem);
    result.write(&result_path)?;
    let written = fs::read(&result_path)
        .with_context(|| format!("read back {}", result_path.display()))?;
    runlog.add_output("run_result", &result_path, base, &written);

    if sink.markdown {
        let report = render_review(&result, &digest);
        let path = sink.paths.review_path(stem);
        write_text(&path, &report)?;
        runlog.add_output("markdown_report", &path, base, report.as_bytes());
    }
    if let Some(code) = &digest.refactored_code {
        let path = sink.paths.refactor_path(stem);
        write_text(&path, code)?;
        runlog.add_output("refactor_sql", &path, base, code.as_bytes());
    }

    let runlog_path = sink.paths.runlog_path(stem);
    runlog.write(&runlog_path)?;
    sink.index.append(&IndexEntry {
        run_id: sink.run_id.to_string(),
        artifact: result.artifact.name.clone(),
        sha256: result.artifact.sha256.clone(),
        status: result.status,
        risk_score: digest.risk_score,
        runlog: display_path(&runlog_path, Some(base)),
    })?;
    Ok((result, digest))
}

fn write_text(path: &Path, text: &str) -> Result<()> {
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))
}

/// Print the prompt every enabled step would receive first, without calling
/// anything. Later steps show their inputs as not yet available.
pub(crate) fn print_dry_run(setup: &ReviewSetup, artifact: &Artifact) {
    let marker = &setup.pipeline.vocabulary().uncertainty_marker;
    println!("[dry-run] review for: {}", artifact.name());
    for stage in setup.pipeline.stages() {
        if !stage.enabled() {
            println!("[dry-run] {}: skipped", stage.name());
            continue;
        }
        for step in stage.chain() {
            let context: Vec<ContextSection<'_>> = step
                .spec
                .inputs
                .iter()
                .map(|input| ContextSection {
                    step: input,
                    output: None,
                })
                .collect();
            let prompt = compose_prompt(&step.template, &step.spec, artifact, marker, &context, None);
            println!("{}", "=".repeat(80));
            if step.spec.name == stage.name() {
                println!("[dry-run] {} prompt", stage.name());
            } else {
                println!("[dry-run] {} fallback `{}` prompt", stage.name(), step.spec.name);
            }
            println!("{}", "-".repeat(80));
            println!("{prompt}");
        }
    }
    println!("{}", "=".repeat(80));
    println!("[dry-run] No LM calls were made. No files were written.");
}
