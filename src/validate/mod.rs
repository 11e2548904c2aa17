//! Output contract enforcement.
//!
//! `Validator::validate` is a pure function of (step, raw output, artifact):
//! no I/O, no clock, no hidden state. The checks run in a fixed order and the
//! first failure wins:
//!
//! 1. syntax (structured formats must parse)
//! 2. schema (exact field set and value types)
//! 3. vocabulary (enumerated values, forbidden tokens)
//! 4. grounding (identifier-like tokens must occur in the artifact)
//! 5. behavior (code that promises preservation must match the artifact)
use crate::artifact::Artifact;
use crate::catalog::{OutputSchema, StepSpec, Vocabulary, CODE_FIELD, TEXT_FIELD};
use crate::output::StructuredOutput;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

mod behavior;
mod grounding;
mod shape;
mod syntax;
mod vocabulary;

pub use behavior::{BehaviorCheck, TokenSequenceCheck};
pub use grounding::{GroundingStrategy, IdentifierGrounding};
pub use syntax::strip_fences;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionKind {
    Syntax,
    Schema,
    Vocabulary,
    Ungrounded,
    BehaviorChange,
    /// The backend failed or timed out; no output was validated.
    BackendError,
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Syntax => write!(f, "SYNTAX"),
            Self::Schema => write!(f, "SCHEMA"),
            Self::Vocabulary => write!(f, "VOCABULARY"),
            Self::Ungrounded => write!(f, "UNGROUNDED"),
            Self::BehaviorChange => write!(f, "BEHAVIOR_CHANGE"),
            Self::BackendError => write!(f, "BACKEND_ERROR"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub kind: RejectionKind,
    pub detail: String,
}

impl Rejection {
    pub fn new(kind: RejectionKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationResult {
    Accepted { output: StructuredOutput },
    Rejected(Rejection),
}

impl ValidationResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            Self::Accepted { .. } => None,
        }
    }
}

impl From<Rejection> for ValidationResult {
    fn from(rejection: Rejection) -> Self {
        Self::Rejected(rejection)
    }
}

pub struct Validator {
    vocabulary: Vocabulary,
    grounding: Box<dyn GroundingStrategy>,
    behavior: Box<dyn BehaviorCheck>,
}

impl Validator {
    pub fn new(vocabulary: Vocabulary) -> Self {
        Self::with_strategies(
            vocabulary,
            Box::new(IdentifierGrounding::new()),
            Box::new(TokenSequenceCheck),
        )
    }

    pub fn with_strategies(
        vocabulary: Vocabulary,
        grounding: Box<dyn GroundingStrategy>,
        behavior: Box<dyn BehaviorCheck>,
    ) -> Self {
        Self {
            vocabulary,
            grounding,
            behavior,
        }
    }

    pub fn validate(&self, spec: &StepSpec, raw: &str, artifact: &Artifact) -> ValidationResult {
        match self.check(&spec.output_schema, raw, artifact) {
            Ok(output) => ValidationResult::Accepted { output },
            Err(rejection) => ValidationResult::Rejected(rejection),
        }
    }

    fn check(
        &self,
        schema: &OutputSchema,
        raw: &str,
        artifact: &Artifact,
    ) -> Result<StructuredOutput, Rejection> {
        let marker = self.vocabulary.uncertainty_marker.as_str();
        match schema {
            OutputSchema::Text { grounded, .. } => {
                let text = raw.trim();
                if text.is_empty() {
                    return Err(Rejection::new(RejectionKind::Schema, "response is empty"));
                }
                let output = StructuredOutput::single(TEXT_FIELD, text.to_string());
                vocabulary::check(schema, &output, marker)?;
                if *grounded {
                    self.check_grounding(schema, &[(TEXT_FIELD, text)], artifact)?;
                }
                Ok(output)
            }
            OutputSchema::Json { fields, .. } => {
                let object = syntax::parse_object(raw)?;
                let output = shape::conform(fields, &object)?;
                vocabulary::check(schema, &output, marker)?;
                let grounded = shape::grounded_strings(fields, &output);
                self.check_grounding(schema, &grounded, artifact)?;
                Ok(output)
            }
            OutputSchema::Code {
                preserve_behavior,
                allowed_edits,
            } => {
                let code = strip_fences(raw);
                if code.is_empty() {
                    return Err(Rejection::new(
                        RejectionKind::Schema,
                        "response contains no code",
                    ));
                }
                if *preserve_behavior {
                    self.behavior
                        .compare(artifact.text(), code, allowed_edits)
                        .map_err(|detail| Rejection::new(RejectionKind::BehaviorChange, detail))?;
                }
                Ok(StructuredOutput::single(CODE_FIELD, code.to_string()))
            }
        }
    }

    fn check_grounding(
        &self,
        schema: &OutputSchema,
        strings: &[(&str, &str)],
        artifact: &Artifact,
    ) -> Result<(), Rejection> {
        let allowed = self.allowed_terms(schema, artifact);
        for (field, text) in strings {
            if let Some(token) = self.grounding.first_ungrounded(text, artifact.text(), &allowed) {
                return Err(Rejection::new(
                    RejectionKind::Ungrounded,
                    format!("`{token}` in field `{field}` does not appear in the artifact"),
                ));
            }
        }
        Ok(())
    }

    /// Lowercased terms accepted without appearing in the artifact.
    fn allowed_terms(&self, schema: &OutputSchema, artifact: &Artifact) -> BTreeSet<String> {
        let mut allowed: BTreeSet<String> = self
            .vocabulary
            .meta_terms
            .iter()
            .map(|term| term.to_lowercase())
            .collect();
        allowed.insert(self.vocabulary.uncertainty_marker.to_lowercase());
        allowed.extend(schema.enum_values().iter().map(|v| v.to_lowercase()));
        allowed.insert(artifact.name().to_lowercase());
        allowed.insert(artifact.stem().to_lowercase());
        allowed
    }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
