//! Append-only record of every attempt in a run.
use crate::validate::ValidationResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Position in the run's total order, starting at 1.
    pub ordinal: u64,
    /// Pipeline position this attempt belongs to.
    pub stage: String,
    pub step_index: usize,
    /// The step spec that was active; differs from `stage` under fallback.
    pub step_name: String,
    /// 0 for the primary step, 1 for its first fallback, and so on.
    pub fallback_depth: usize,
    /// Attempt number within the active spec, starting at 0.
    pub attempt_index: u32,
    /// SHA-256 of the raw output; absent when the backend produced none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
    /// Whether the prompt carried a corrective section.
    pub corrective: bool,
    pub result: ValidationResult,
}

/// Attempt fields supplied by the orchestrator; the trail assigns the ordinal.
pub(crate) struct NewAttempt {
    pub stage: String,
    pub step_index: usize,
    pub step_name: String,
    pub fallback_depth: usize,
    pub attempt_index: u32,
    pub raw_output_hash: Option<String>,
    pub raw_output: Option<String>,
    pub corrective: bool,
    pub result: ValidationResult,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditTrail {
    records: Vec<AttemptRecord>,
}

impl AuditTrail {
    pub(crate) fn append(&mut self, attempt: NewAttempt) {
        let ordinal = self.records.len() as u64 + 1;
        self.records.push(AttemptRecord {
            ordinal,
            stage: attempt.stage,
            step_index: attempt.step_index,
            step_name: attempt.step_name,
            fallback_depth: attempt.fallback_depth,
            attempt_index: attempt.attempt_index,
            raw_output_hash: attempt.raw_output_hash,
            raw_output: attempt.raw_output,
            corrective: attempt.corrective,
            result: attempt.result,
        });
    }

    pub fn records(&self) -> &[AttemptRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records whose active spec was `step_name`.
    #[cfg(test)]
    pub fn for_step<'a>(&'a self, step_name: &'a str) -> impl Iterator<Item = &'a AttemptRecord> {
        self.records.iter().filter(move |r| r.step_name == step_name)
    }
}
