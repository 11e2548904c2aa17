//! Prompt templates and prompt composition.
//!
//! Templates are Markdown with `{placeholder}` slots. The built-in set is
//! compiled into the binary; a directory of `<id>.md` files can override or
//! extend it. Composition substitutes in a single pass, so text coming from
//! the artifact or from earlier outputs is never re-expanded.
use crate::artifact::Artifact;
use crate::catalog::StepSpec;
use crate::util::preview;
use crate::validate::Rejection;
use anyhow::{Context, Result};
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

// Prompt templates loaded at compile time
const SUMMARY: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/summary.md"));
const SUMMARY_BRIEF: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/summary_brief.md"
));
const CLASSIFICATION: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/classification.md"
));
const CLASSIFICATION_BRIEF: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/classification_brief.md"
));
const ANALYSIS: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/analysis.md"));
const ANALYSIS_BRIEF: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/prompts/analysis_brief.md"
));
const REFACTOR: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/refactor.md"));
const GATE: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/prompts/gate.md"));

/// Bytes of a rejected response echoed back in a corrective prompt.
const MAX_ECHOED_RESPONSE_BYTES: usize = 1000;

/// Registry of prompt templates keyed by template id.
#[derive(Debug, Clone, Default)]
pub struct PromptTemplates {
    templates: BTreeMap<String, String>,
}

impl PromptTemplates {
    pub fn builtin() -> Self {
        let mut templates = Self::default();
        for (id, text) in [
            ("summary", SUMMARY),
            ("summary_brief", SUMMARY_BRIEF),
            ("classification", CLASSIFICATION),
            ("classification_brief", CLASSIFICATION_BRIEF),
            ("analysis", ANALYSIS),
            ("analysis_brief", ANALYSIS_BRIEF),
            ("refactor", REFACTOR),
            ("gate", GATE),
        ] {
            templates.insert(id, text);
        }
        templates
    }

    /// Built-in templates overlaid with every `<id>.md` file in `dir`.
    pub fn with_overrides(dir: &Path) -> Result<Self> {
        let mut templates = Self::builtin();
        let entries =
            fs::read_dir(dir).with_context(|| format!("read prompts dir {}", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("list prompts dir {}", dir.display()))?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("md") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            let text = fs::read_to_string(&path)
                .with_context(|| format!("read prompt template {}", path.display()))?;
            tracing::debug!(template = id, path = %path.display(), "prompt template override");
            templates.insert(id, &text);
        }
        Ok(templates)
    }

    pub fn insert(&mut self, id: &str, text: &str) {
        self.templates.insert(id.to_string(), text.to_string());
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.templates.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.templates.contains_key(id)
    }
}

/// Accepted output of an earlier step, as shown to a later step.
pub struct ContextSection<'a> {
    pub step: &'a str,
    /// `None` when the step failed or was skipped.
    pub output: Option<&'a crate::output::StructuredOutput>,
}

/// What went wrong with the previous attempt of the same step.
pub struct Correction<'a> {
    pub rejection: &'a Rejection,
    pub previous_response: Option<&'a str>,
}

/// Fill a step's template for one attempt.
///
/// The artifact always arrives through `{code}`; earlier outputs only ever
/// arrive through `{context}`.
pub fn compose_prompt(
    template: &str,
    spec: &StepSpec,
    artifact: &Artifact,
    uncertainty_marker: &str,
    context: &[ContextSection<'_>],
    correction: Option<&Correction<'_>>,
) -> String {
    let mut values = BTreeMap::new();
    values.insert("artifact_name", artifact.name().to_string());
    values.insert("code", artifact.text().to_string());
    values.insert("schema", spec.output_schema.template_hint(uncertainty_marker));
    values.insert("uncertainty_marker", uncertainty_marker.to_string());
    values.insert("step", spec.name.clone());
    values.insert("context", render_context(context));

    let mut prompt = render(template, &values);
    if let Some(correction) = correction {
        prompt.push_str(&render_correction(correction, spec, uncertainty_marker));
    }
    prompt
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"))
}

/// Single-pass substitution; unknown placeholders are left untouched.
fn render(template: &str, values: &BTreeMap<&str, String>) -> String {
    placeholder_pattern()
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

fn render_context(context: &[ContextSection<'_>]) -> String {
    if context.is_empty() {
        return "(none)".to_string();
    }
    let mut text = String::new();
    for section in context {
        text.push_str(&format!("### Accepted output of `{}`\n", section.step));
        match section.output {
            Some(output) => {
                let json = serde_json::to_string_pretty(output)
                    .unwrap_or_else(|_| "(unprintable)".to_string());
                text.push_str(&format!("```json\n{json}\n```\n\n"));
            }
            None => text.push_str("(no accepted output: the step failed or was skipped)\n\n"),
        }
    }
    text.trim_end().to_string()
}

fn render_correction(
    correction: &Correction<'_>,
    spec: &StepSpec,
    uncertainty_marker: &str,
) -> String {
    let mut section = format!(
        "\n\n## Previous Response Rejected\n\n\
         Your previous response failed validation. Fix the problem and answer again.\n\n\
         **Reason:** {}: {}\n\n",
        correction.rejection.kind, correction.rejection.detail
    );
    if let Some(previous) = correction.previous_response {
        section.push_str(&format!(
            "**Your previous response (may be truncated):**\n```\n{}\n```\n\n",
            preview(previous, MAX_ECHOED_RESPONSE_BYTES)
        ));
    }
    section.push_str(&format!(
        "## Response Format Reminder\n\n{}\n\n\
         Reference only identifiers that appear in the input code. \
         Write {uncertainty_marker} when the code does not say.\n",
        spec.output_schema.template_hint(uncertainty_marker)
    ));
    section
}
