//! Step catalog: the immutable configuration of pipeline stages.
//!
//! A catalog is loaded once and shared read-only by every run. It names each
//! step's prompt template, output schema, retry budget, fallback, and
//! criticality; the engine never hard-codes any of these.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

mod check;
mod pipeline;
mod schema;

pub use check::{catalog_problems, validate_catalog};
pub use pipeline::{Pipeline, ResolvedStep, Selection, Stage};
pub use schema::{EditClass, FieldKind, FieldSpec, OutputSchema, CODE_FIELD, TEXT_FIELD};
#[cfg(test)]
pub use schema::RecordField;

/// Current schema version for catalog files.
pub const CATALOG_SCHEMA_VERSION: u32 = 1;
/// Literal accepted wherever the model cannot tell.
pub const DEFAULT_UNCERTAINTY_MARKER: &str = "UNKNOWN";

const DEFAULT_CATALOG_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/catalog/default.json"));
const GATE_CATALOG_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/catalog/gate.json"));

/// Catalogs compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinCatalog {
    /// Source review: summary, classification, analysis, refactor.
    Review,
    /// CI log deploy decision.
    Gate,
}

impl BuiltinCatalog {
    pub fn select(gate: bool) -> Self {
        if gate {
            Self::Gate
        } else {
            Self::Review
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Review => "review",
            Self::Gate => "gate",
        }
    }

    /// Pretty JSON of the catalog, as a starting point for edits.
    pub fn json(self) -> &'static str {
        match self {
            Self::Review => DEFAULT_CATALOG_JSON,
            Self::Gate => GATE_CATALOG_JSON,
        }
    }

    pub fn load(self) -> Result<StepCatalog> {
        serde_json::from_str(self.json())
            .with_context(|| format!("parse built-in {} catalog", self.name()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Exhaustion fails the whole run.
    Required,
    /// Exhaustion is recorded and the run moves on.
    Optional,
}

impl fmt::Display for Criticality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => write!(f, "required"),
            Self::Optional => write!(f, "optional"),
        }
    }
}

fn default_criticality() -> Criticality {
    Criticality::Required
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Template id, resolved against the prompt registry.
    pub prompt_template: String,
    pub output_schema: OutputSchema,
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<String>,
    #[serde(default = "default_criticality")]
    pub criticality: Criticality,
    /// Earlier pipeline steps whose accepted output this step may read.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Append the rejection reason to the prompt when retrying.
    #[serde(default = "default_true")]
    pub corrective_retry: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vocabulary {
    #[serde(default = "default_marker")]
    pub uncertainty_marker: String,
    /// Terms accepted by the grounding check even when absent from the artifact.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_terms: Vec<String>,
}

fn default_marker() -> String {
    DEFAULT_UNCERTAINTY_MARKER.to_string()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            uncertainty_marker: default_marker(),
            meta_terms: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCatalog {
    pub schema_version: u32,
    #[serde(default)]
    pub vocabulary: Vocabulary,
    pub steps: Vec<StepSpec>,
    /// Execution order. Defaults to every step that is nobody's fallback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<String>>,
}

impl StepCatalog {
    pub fn step(&self, name: &str) -> Option<&StepSpec> {
        self.steps.iter().find(|step| step.name == name)
    }

    pub fn pipeline_names(&self) -> Vec<&str> {
        if let Some(pipeline) = &self.pipeline {
            return pipeline.iter().map(String::as_str).collect();
        }
        self.steps
            .iter()
            .filter(|step| {
                !self
                    .steps
                    .iter()
                    .any(|other| other.fallback.as_deref() == Some(step.name.as_str()))
            })
            .map(|step| step.name.as_str())
            .collect()
    }
}

/// The review catalog compiled into the binary.
#[cfg(test)]
pub fn default_catalog() -> Result<StepCatalog> {
    BuiltinCatalog::Review.load()
}

pub fn load_catalog(path: &Path) -> Result<StepCatalog> {
    let bytes = fs::read(path).with_context(|| format!("read catalog {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parse catalog JSON {}", path.display()))
}

/// Load `path` when given, else the built-in catalog.
pub fn resolve_catalog(path: Option<&Path>, builtin: BuiltinCatalog) -> Result<StepCatalog> {
    match path {
        Some(path) => load_catalog(path),
        None => builtin.load(),
    }
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
