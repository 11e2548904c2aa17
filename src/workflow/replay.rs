//! `stepgate replay`: re-validate recorded model output offline.
//!
//! Every attempt that kept its raw output is pushed through the current
//! validator again and must reach the same verdict. Nothing calls a model.
use super::EXIT_FAILED;
use crate::artifact::Artifact;
use crate::catalog::{resolve_catalog, BuiltinCatalog, StepCatalog};
use crate::cli::ReplayArgs;
use crate::engine::AttemptRecord;
use crate::report::RunResult;
use crate::validate::{ValidationResult, Validator};
use anyhow::{Context, Result};
use std::process::ExitCode;

/// Outcome of replaying one run result.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReplayReport {
    pub(crate) replayed: usize,
    /// Attempts recorded without raw output (store_raw_output off, or backend errors).
    pub(crate) skipped: usize,
    pub(crate) divergences: Vec<String>,
}

pub fn run_replay(args: &ReplayArgs) -> Result<ExitCode> {
    let result = RunResult::load(&args.run_result)?;
    let artifact = Artifact::load(&args.artifact)?;
    if artifact.id().sha256 != result.artifact.sha256 {
        eprintln!(
            "error: {} does not match the reviewed artifact {} (sha256 {} vs {})",
            args.artifact.display(),
            result.artifact.name,
            artifact.id().sha256,
            result.artifact.sha256
        );
        return Ok(ExitCode::from(EXIT_FAILED));
    }
    let catalog = resolve_catalog(
        args.catalog.as_deref(),
        BuiltinCatalog::select(args.gate),
    )?;

    let report = replay(&result, &catalog, &artifact)?;
    for divergence in &report.divergences {
        eprintln!("diverged: {divergence}");
    }
    eprintln!(
        "replay: {} attempt(s) replayed, {} without raw output, {} divergence(s)",
        report.replayed,
        report.skipped,
        report.divergences.len()
    );
    if report.divergences.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_FAILED))
    }
}

pub(crate) fn replay(
    result: &RunResult,
    catalog: &StepCatalog,
    artifact: &Artifact,
) -> Result<ReplayReport> {
    let validator = Validator::new(catalog.vocabulary.clone());
    let mut report = ReplayReport::default();
    for record in &result.audit_trail {
        let Some(raw) = &record.raw_output else {
            report.skipped += 1;
            continue;
        };
        let Some(spec) = catalog.step(&record.step_name) else {
            report.divergences.push(format!(
                "#{} step `{}` is not in the catalog",
                record.ordinal, record.step_name
            ));
            continue;
        };
        let replayed = validator.validate(spec, raw, artifact);
        let recorded = serde_json::to_value(&record.result)
            .with_context(|| format!("serialize recorded verdict #{}", record.ordinal))?;
        let fresh = serde_json::to_value(&replayed)
            .with_context(|| format!("serialize replayed verdict #{}", record.ordinal))?;
        report.replayed += 1;
        if recorded != fresh {
            report.divergences.push(describe(record, &replayed));
        }
    }
    Ok(report)
}

fn describe(record: &AttemptRecord, replayed: &ValidationResult) -> String {
    let verdict = |accepted: bool, rejection: Option<String>| match (accepted, rejection) {
        (true, _) => "accepted".to_string(),
        (false, Some(rejection)) => format!("rejected ({rejection})"),
        (false, None) => "rejected".to_string(),
    };
    format!(
        "#{} {} attempt {}: recorded {}, now {}",
        record.ordinal,
        record.step_name,
        record.attempt_index,
        verdict(
            record.result.is_accepted(),
            record.result.rejection().map(ToString::to_string)
        ),
        verdict(
            replayed.is_accepted(),
            replayed.rejection().map(ToString::to_string)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{default_catalog, Pipeline, Selection};
    use crate::engine::{CancelToken, EngineSettings, Orchestrator};
    use crate::invoker::ScriptedInvoker;
    use crate::prompts::PromptTemplates;
    use crate::report::assemble;
    use std::sync::Arc;

    const SOURCE: &str = "FUNCTION calc_total(p_invoice_id NUMBER) RETURN NUMBER IS\nBEGIN\n  RETURN 0;\nEND;";

    fn reviewed(responses: &[&str]) -> (RunResult, StepCatalog, Artifact) {
        let catalog = default_catalog().expect("catalog");
        let pipeline = Pipeline::build(
            &catalog,
            &PromptTemplates::builtin(),
            &Selection {
                enable: Default::default(),
                skip: ["classification", "analysis"].iter().map(|s| s.to_string()).collect(),
            },
        )
        .expect("pipeline");
        let validator = Validator::new(catalog.vocabulary.clone());
        let invoker = Arc::new(ScriptedInvoker::new(responses.iter().copied()));
        let artifact = Artifact::new("calc_total.sql", SOURCE);
        let ctx = Orchestrator::new(&pipeline, &validator, invoker, EngineSettings::default())
            .run(artifact.clone(), &CancelToken::new());
        (assemble(&ctx), catalog, artifact)
    }

    #[test]
    fn replay_reproduces_recorded_verdicts() {
        let (result, catalog, artifact) = reviewed(&[
            "The function wobble_calc returns zero.",
            "calc_total returns 0 for any p_invoice_id.",
        ]);
        let report = replay(&result, &catalog, &artifact).expect("replay");
        assert_eq!(report.replayed, 2);
        assert_eq!(report.skipped, 0);
        assert!(report.divergences.is_empty(), "{:?}", report.divergences);
    }

    #[test]
    fn tampered_output_is_reported() {
        let (mut result, catalog, artifact) =
            reviewed(&["calc_total returns 0 for any p_invoice_id."]);
        result.audit_trail[0].raw_output = Some("invented_proc does things".to_string());
        let report = replay(&result, &catalog, &artifact).expect("replay");
        assert_eq!(report.divergences.len(), 1);
        assert!(report.divergences[0].contains("recorded accepted"));
    }

    #[test]
    fn records_without_raw_output_are_counted() {
        let (mut result, catalog, artifact) =
            reviewed(&["calc_total returns 0 for any p_invoice_id."]);
        result.audit_trail[0].raw_output = None;
        let report = replay(&result, &catalog, &artifact).expect("replay");
        assert_eq!(report.replayed, 0);
        assert_eq!(report.skipped, 1);
    }
}
