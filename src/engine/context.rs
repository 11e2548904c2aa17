//! Per-run state, owned by exactly one orchestrator run.
use super::audit::{AuditTrail, NewAttempt};
use crate::artifact::Artifact;
use crate::catalog::Criticality;
use crate::output::StructuredOutput;
use crate::validate::Rejection;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepState {
    Pending,
    Attempting,
    Retrying,
    Fallback,
    Accepted,
    StepFailed,
    /// Disabled for this run; never attempted.
    Skipped,
    /// Cancellation was observed before this step could finish.
    Cancelled,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::StepFailed | Self::Skipped | Self::Cancelled
        )
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::Attempting => "ATTEMPTING",
            Self::Retrying => "RETRYING",
            Self::Fallback => "FALLBACK",
            Self::Accepted => "ACCEPTED",
            Self::StepFailed => "STEP_FAILED",
            Self::Skipped => "SKIPPED",
            Self::Cancelled => "CANCELLED",
        };
        write!(f, "{label}")
    }
}

/// Terminal state of one pipeline position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: String,
    pub criticality: Criticality,
    pub state: StepState,
    /// Spec whose output was accepted, when it was a fallback or the step itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_by: Option<String>,
    pub attempts: u32,
    pub fallbacks_used: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_rejection: Option<Rejection>,
}

impl StepOutcome {
    pub(crate) fn untouched(step: &str, criticality: Criticality, state: StepState) -> Self {
        Self {
            step: step.to_string(),
            criticality,
            state,
            accepted_by: None,
            attempts: 0,
            fallbacks_used: 0,
            last_rejection: None,
        }
    }
}

/// Why a run ended FAILED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunFailure {
    /// A required step ran out of retries and fallbacks.
    StepFailed {
        step: String,
        last_rejection: Rejection,
        attempts: u32,
        fallbacks_exhausted: usize,
    },
    Cancelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_step: Option<String>,
    },
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StepFailed {
                step,
                last_rejection,
                attempts,
                fallbacks_exhausted,
            } => write!(
                f,
                "required step `{step}` failed after {attempts} attempt(s) and {fallbacks_exhausted} fallback(s); last rejection {last_rejection}"
            ),
            Self::Cancelled {
                next_step: Some(step),
            } => write!(f, "run cancelled before step `{step}` finished"),
            Self::Cancelled { next_step: None } => write!(f, "run cancelled"),
        }
    }
}

#[derive(Debug)]
pub struct ExecutionContext {
    artifact: Artifact,
    steps: Vec<String>,
    accepted: BTreeMap<String, StructuredOutput>,
    audit: AuditTrail,
    outcomes: Vec<StepOutcome>,
    status: RunStatus,
    failure: Option<RunFailure>,
    current_step: usize,
}

impl ExecutionContext {
    pub(crate) fn new(artifact: Artifact, steps: Vec<String>) -> Self {
        Self {
            artifact,
            steps,
            accepted: BTreeMap::new(),
            audit: AuditTrail::default(),
            outcomes: Vec::new(),
            status: RunStatus::Running,
            failure: None,
            current_step: 0,
        }
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Declared pipeline order.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn accepted(&self) -> &BTreeMap<String, StructuredOutput> {
        &self.accepted
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    pub fn outcomes(&self) -> &[StepOutcome] {
        &self.outcomes
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&RunFailure> {
        self.failure.as_ref()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub(crate) fn enter_step(&mut self, index: usize) {
        self.current_step = index;
    }

    pub(crate) fn record_attempt(&mut self, attempt: NewAttempt) {
        self.audit.append(attempt);
    }

    pub(crate) fn accept(&mut self, step: &str, output: StructuredOutput) {
        self.accepted.insert(step.to_string(), output);
    }

    pub(crate) fn finish_step(&mut self, outcome: StepOutcome) {
        self.outcomes.push(outcome);
    }

    pub(crate) fn fail(&mut self, failure: RunFailure) {
        self.status = RunStatus::Failed;
        self.failure = Some(failure);
    }

    pub(crate) fn complete(&mut self) {
        if self.status == RunStatus::Running {
            self.status = RunStatus::Completed;
        }
    }
}
