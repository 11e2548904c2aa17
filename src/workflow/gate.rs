//! `stepgate gate`: turn a CI log into a deploy decision.
//!
//! The log is the artifact and the gate catalog is the pipeline, so the
//! decision goes through the same validation, retries and audit trail as a
//! source review. The command exits non-zero whenever the deploy must not
//! proceed.
use super::lm_log::LmLog;
use super::paths::{output_stem, RunPaths};
use super::review::{print_dry_run, review_artifact, Progress, ReviewSink};
use super::runlog::RunIndex;
use super::setup::ReviewSetup;
use super::{resolve_run_id, EXIT_FAILED};
use crate::artifact::Artifact;
use crate::catalog::BuiltinCatalog;
use crate::cli::GateArgs;
use crate::engine::AttemptObserver;
use crate::report::GateVerdict;
use crate::util::{display_path, now_epoch_ms};
use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;

pub fn run_gate(args: &GateArgs) -> Result<ExitCode> {
    let setup = ReviewSetup::load(&args.engine, BuiltinCatalog::Gate)?;
    let log = Artifact::load(&args.log)?;
    if args.dry_run {
        print_dry_run(&setup, &log);
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
        markdown: false,
    };

    let stem = output_stem(log.name());
    eprintln!("gate: {} with {}", log.id(), invoker.describe());
    let (result, _) = review_artifact(
        &setup,
        log,
        &args.log,
        &stem,
        invoker,
        &setup.cancel_token(),
        &sink,
    )?;

    let verdict = GateVerdict::from_result(&run_id, &result, now_epoch_ms()?);
    let verdict_path = paths.gate_verdict_path();
    verdict.write(&verdict_path)?;

    println!(
        "gate: deploy_ok={}, severity={}",
        verdict.deploy_ok, verdict.severity
    );
    for reason in &verdict.reasons {
        println!("- {reason}");
    }
    eprintln!("gate: verdict at {}", display_path(&verdict_path, None));
    if verdict.deploy_ok {
        println!("gate: OK to deploy");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("gate: BLOCKING DEPLOY");
        Ok(ExitCode::from(EXIT_FAILED))
    }
}
