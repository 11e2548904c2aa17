//! The retry, fallback, fail state machine.
//!
//! Stages run strictly in pipeline order. Within a stage the active spec is
//! attempted until it is accepted or its retries run out, then the next spec
//! in the fallback chain takes over with a fresh attempt count. Every attempt,
//! including backend failures, is appended to the audit trail before the
//! machine moves on.
use super::audit::{AttemptRecord, NewAttempt};
use super::cancel::CancelToken;
use super::context::{ExecutionContext, RunFailure, StepOutcome, StepState};
use super::deadline::invoke_with_deadline;
use crate::artifact::Artifact;
use crate::catalog::{Criticality, Pipeline, ResolvedStep, Stage};
use crate::invoker::{InvocationLimit, ModelInvoker};
use crate::prompts::{compose_prompt, ContextSection, Correction};
use crate::util::sha256_hex;
use crate::validate::{Rejection, RejectionKind, ValidationResult, Validator};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Per-attempt backend timeout.
    pub timeout: Duration,
    /// Extra wait before the orchestrator gives up on a backend that ignores
    /// its own timeout.
    pub deadline_grace: Duration,
    /// Keep raw backend text in audit records, not just its hash.
    pub store_raw_output: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            deadline_grace: Duration::from_secs(2),
            store_raw_output: true,
        }
    }
}

/// Hooks for logging and progress; never influence the run.
pub trait AttemptObserver: Send + Sync {
    fn attempt_finished(
        &self,
        _artifact: &Artifact,
        _record: &AttemptRecord,
        _prompt: &str,
        _elapsed: Duration,
    ) {
    }

    fn step_finished(&self, _artifact: &Artifact, _outcome: &StepOutcome) {}
}

pub struct Orchestrator<'p> {
    pipeline: &'p Pipeline,
    validator: &'p Validator,
    invoker: Arc<dyn ModelInvoker>,
    limit: Option<InvocationLimit>,
    settings: EngineSettings,
    observers: Vec<Arc<dyn AttemptObserver>>,
}

/// Mutable bookkeeping for the stage currently executing.
struct StageRun<'s> {
    stage: &'s Stage,
    index: usize,
    state: StepState,
    depth: usize,
    attempt: u32,
    total_attempts: u32,
    last: Option<(Rejection, Option<String>)>,
    accepted_by: Option<String>,
}

impl<'s> StageRun<'s> {
    fn active(&self) -> &'s ResolvedStep {
        &self.stage.chain()[self.depth]
    }

    fn outcome(self) -> StepOutcome {
        let primary = &self.stage.primary().spec;
        StepOutcome {
            step: primary.name.clone(),
            criticality: primary.criticality,
            state: self.state,
            accepted_by: self.accepted_by,
            attempts: self.total_attempts,
            fallbacks_used: self.depth,
            last_rejection: match self.state {
                StepState::Accepted => None,
                _ => self.last.map(|(rejection, _)| rejection),
            },
        }
    }
}

impl<'p> Orchestrator<'p> {
    pub fn new(
        pipeline: &'p Pipeline,
        validator: &'p Validator,
        invoker: Arc<dyn ModelInvoker>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            pipeline,
            validator,
            invoker,
            limit: None,
            settings,
            observers: Vec::new(),
        }
    }

    /// Queue every attempt behind a shared in-flight limit.
    pub fn with_limit(mut self, limit: InvocationLimit) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn AttemptObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn run(&self, artifact: Artifact, cancel: &CancelToken) -> ExecutionContext {
        let names = self
            .pipeline
            .stages()
            .iter()
            .map(|stage| stage.name().to_string())
            .collect();
        let mut ctx = ExecutionContext::new(artifact, names);
        tracing::info!(artifact = %ctx.artifact().id(), stages = ctx.steps().len(), "run started");

        let stages = self.pipeline.stages();
        let mut stopped_at = None;
        for (index, stage) in stages.iter().enumerate() {
            ctx.enter_step(index);
            let outcome = if stage.enabled() {
                self.run_stage(&mut ctx, index, stage, cancel)
            } else {
                StepOutcome::untouched(
                    stage.name(),
                    stage.primary().spec.criticality,
                    StepState::Skipped,
                )
            };
            for observer in &self.observers {
                observer.step_finished(ctx.artifact(), &outcome);
            }

            let failure = match outcome.state {
                StepState::Cancelled => Some(RunFailure::Cancelled {
                    next_step: Some(outcome.step.clone()),
                }),
                StepState::StepFailed if outcome.criticality == Criticality::Required => {
                    Some(RunFailure::StepFailed {
                        step: outcome.step.clone(),
                        last_rejection: outcome.last_rejection.clone().unwrap_or_else(|| {
                            Rejection::new(RejectionKind::BackendError, "no attempt was made")
                        }),
                        attempts: outcome.attempts,
                        fallbacks_exhausted: outcome.fallbacks_used,
                    })
                }
                _ => None,
            };
            ctx.finish_step(outcome);
            if let Some(failure) = failure {
                tracing::warn!(
                    artifact = %ctx.artifact().id(),
                    step_index = ctx.current_step(),
                    %failure,
                    "run failed"
                );
                ctx.fail(failure);
                stopped_at = Some(index);
                break;
            }
        }

        // Positions never reached stay PENDING so the report shows them.
        if let Some(stopped) = stopped_at {
            for stage in &stages[stopped + 1..] {
                ctx.finish_step(StepOutcome::untouched(
                    stage.name(),
                    stage.primary().spec.criticality,
                    StepState::Pending,
                ));
            }
        }
        ctx.complete();
        tracing::info!(
            artifact = %ctx.artifact().id(),
            status = %ctx.status(),
            attempts = ctx.audit().len(),
            accepted = ctx.accepted().len(),
            "run finished"
        );
        ctx
    }

    fn run_stage(
        &self,
        ctx: &mut ExecutionContext,
        index: usize,
        stage: &Stage,
        cancel: &CancelToken,
    ) -> StepOutcome {
        let mut run = StageRun {
            stage,
            index,
            state: StepState::Pending,
            depth: 0,
            attempt: 0,
            total_attempts: 0,
            last: None,
            accepted_by: None,
        };

        loop {
            run.state = match run.state {
                StepState::Pending | StepState::Attempting | StepState::Retrying => {
                    if cancel.is_cancelled() {
                        StepState::Cancelled
                    } else {
                        self.attempt(ctx, &mut run)
                    }
                }
                StepState::Fallback => {
                    run.depth += 1;
                    run.attempt = 0;
                    run.last = None;
                    tracing::info!(
                        stage = stage.name(),
                        fallback = %run.active().spec.name,
                        "switching to fallback"
                    );
                    StepState::Attempting
                }
                terminal => {
                    debug_assert!(terminal.is_terminal());
                    return run.outcome();
                }
            };
        }
    }

    /// One ATTEMPTING pass; returns the state the stage moves to.
    fn attempt(&self, ctx: &mut ExecutionContext, run: &mut StageRun<'_>) -> StepState {
        let active = run.active();
        let spec = &active.spec;
        let correction = match (&run.last, spec.corrective_retry) {
            (Some((rejection, previous)), true) => Some(Correction {
                rejection,
                previous_response: previous.as_deref(),
            }),
            _ => None,
        };
        let corrective = correction.is_some();

        // Earlier accepted outputs only; raw text of any step never reaches a prompt.
        let context: Vec<ContextSection<'_>> = spec
            .inputs
            .iter()
            .map(|input| ContextSection {
                step: input,
                output: ctx.accepted().get(input),
            })
            .collect();
        let prompt = compose_prompt(
            &active.template,
            spec,
            ctx.artifact(),
            &self.pipeline.vocabulary().uncertainty_marker,
            &context,
            correction.as_ref(),
        );

        let permit = self.limit.as_ref().map(InvocationLimit::acquire);
        let start = Instant::now();
        let response = invoke_with_deadline(
            &self.invoker,
            prompt.clone(),
            self.settings.timeout,
            self.settings.deadline_grace,
            permit,
        );
        let elapsed = start.elapsed();

        let (raw, result) = match response {
            Ok(raw) => {
                let result = self.validator.validate(spec, &raw, ctx.artifact());
                (Some(raw), result)
            }
            Err(err) => (
                None,
                ValidationResult::Rejected(Rejection::new(
                    RejectionKind::BackendError,
                    err.to_string(),
                )),
            ),
        };

        ctx.record_attempt(NewAttempt {
            stage: run.stage.name().to_string(),
            step_index: run.index,
            step_name: spec.name.clone(),
            fallback_depth: run.depth,
            attempt_index: run.attempt,
            raw_output_hash: raw.as_deref().map(|raw| sha256_hex(raw.as_bytes())),
            raw_output: raw.clone().filter(|_| self.settings.store_raw_output),
            corrective,
            result: result.clone(),
        });
        if let Some(record) = ctx.audit().records().last() {
            for observer in &self.observers {
                observer.attempt_finished(ctx.artifact(), record, &prompt, elapsed);
            }
        }
        run.total_attempts += 1;

        match result {
            ValidationResult::Accepted { output } => {
                tracing::info!(
                    stage = run.stage.name(),
                    step = %spec.name,
                    attempt = run.attempt,
                    "step accepted"
                );
                ctx.accept(run.stage.name(), output);
                run.accepted_by = Some(spec.name.clone());
                StepState::Accepted
            }
            ValidationResult::Rejected(rejection) => {
                tracing::warn!(
                    stage = run.stage.name(),
                    step = %spec.name,
                    attempt = run.attempt,
                    kind = %rejection.kind,
                    detail = %rejection.detail,
                    "attempt rejected"
                );
                run.last = Some((rejection, raw));
                if run.attempt < spec.max_retries {
                    run.attempt += 1;
                    StepState::Retrying
                } else if run.depth + 1 < run.stage.chain().len() {
                    StepState::Fallback
                } else {
                    StepState::StepFailed
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
