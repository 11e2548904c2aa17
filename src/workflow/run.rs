//! `stepgate run`: review one file.
use super::lm_log::LmLog;
use super::paths::{output_stem, RunPaths};
use super::review::{print_dry_run, review_artifact, Progress, ReviewSink};
use super::runlog::RunIndex;
use super::setup::ReviewSetup;
use super::{resolve_run_id, EXIT_FAILED};
use crate::artifact::Artifact;
use crate::catalog::BuiltinCatalog;
use crate::cli::RunArgs;
use crate::engine::{AttemptObserver, RunStatus};
use crate::util::display_path;
use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;

pub fn run_review(args: &RunArgs) -> Result<ExitCode> {
    let setup = ReviewSetup::load(&args.engine, BuiltinCatalog::Review)?;
    let artifact = Artifact::load(&args.artifact)?;
    if args.dry_run {
        print_dry_run(&setup, &artifact);
        return Ok(ExitCode::SUCCESS);
    }

    let invoker = setup.invoker(args.engine.lm.as_deref(), args.engine.responses.as_deref())?;
    let run_id = resolve_run_id(args.run_id.as_deref())?;
    let paths = RunPaths::new(&args.out, &run_id);
    paths.ensure()?;
    let index = RunIndex::new(paths.index_path());
    let lm_log = LmLog::new(
        &run_id,
        paths.lm_log_path(),
        setup.log_content.then(|| paths.lm_content_dir()),
    );
    let observers: Vec<Arc<dyn AttemptObserver>> = vec![Arc::new(lm_log), Arc::new(Progress)];
    let sink = ReviewSink {
        run_id: &run_id,
        paths: &paths,
        index: &index,
        observers: &observers,
        markdown: !args.no_markdown,
    };

    let stem = output_stem(artifact.name());
    eprintln!("review: {} with {}", artifact.id(), invoker.describe());
    let (result, digest) = review_artifact(
        &setup,
        artifact,
        &args.artifact,
        &stem,
        invoker,
        &setup.cancel_token(),
        &sink,
    )?;

    let result_path = paths.run_result_path(&stem);
    eprintln!(
        "review: {} {} (risk {}, {} attempt(s)); result at {}",
        result.artifact.name,
        result.status,
        digest.risk_score,
        result.audit_trail.len(),
        display_path(&result_path, None)
    );
    if let Some(summary) = result.failure_summary() {
        eprintln!("error: {summary}");
    }
    Ok(match result.status {
        RunStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::from(EXIT_FAILED),
    })
}
