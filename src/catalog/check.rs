//! Static validation of a step catalog.
//!
//! All problems are collected rather than stopping at the first one so the
//! `check` command can report a broken catalog in one pass.
use super::{FieldKind, OutputSchema, StepCatalog, CATALOG_SCHEMA_VERSION};
use crate::prompts::PromptTemplates;
use anyhow::{anyhow, Result};
use std::collections::BTreeSet;

/// Fail with every catalog problem listed, one per line.
pub fn validate_catalog(catalog: &StepCatalog, templates: &PromptTemplates) -> Result<()> {
    let problems = catalog_problems(catalog, templates);
    if problems.is_empty() {
        return Ok(());
    }
    Err(anyhow!(
        "invalid step catalog:\n{}",
        problems
            .iter()
            .map(|problem| format!("  - {problem}"))
            .collect::<Vec<_>>()
            .join("\n")
    ))
}

pub fn catalog_problems(catalog: &StepCatalog, templates: &PromptTemplates) -> Vec<String> {
    let mut problems = Vec::new();

    if catalog.schema_version != CATALOG_SCHEMA_VERSION {
        problems.push(format!(
            "unsupported catalog schema_version {} (expected {})",
            catalog.schema_version, CATALOG_SCHEMA_VERSION
        ));
    }
    if catalog.vocabulary.uncertainty_marker.trim().is_empty() {
        problems.push("vocabulary.uncertainty_marker must be non-empty".to_string());
    }
    if catalog.steps.is_empty() {
        problems.push("catalog declares no steps".to_string());
    }

    let mut seen = BTreeSet::new();
    for step in &catalog.steps {
        if step.name.trim().is_empty() {
            problems.push("step name must be non-empty".to_string());
            continue;
        }
        if !seen.insert(step.name.as_str()) {
            problems.push(format!("step `{}` is declared more than once", step.name));
        }
        if !templates.contains(&step.prompt_template) {
            problems.push(format!(
                "step `{}` references unknown prompt template `{}`",
                step.name, step.prompt_template
            ));
        }
        check_schema(&step.name, &step.output_schema, &mut problems);
        check_fallback(catalog, &step.name, &mut problems);
    }

    check_pipeline(catalog, &mut problems);
    problems
}

fn check_schema(step: &str, schema: &OutputSchema, problems: &mut Vec<String>) {
    let OutputSchema::Json { fields, .. } = schema else {
        return;
    };
    if fields.is_empty() {
        problems.push(format!("step `{step}` declares a json schema with no fields"));
    }
    let mut names = BTreeSet::new();
    for field in fields {
        if !names.insert(field.name.as_str()) {
            problems.push(format!("step `{step}` declares field `{}` twice", field.name));
        }
        match &field.kind {
            FieldKind::Enum { values } | FieldKind::EnumList { values } if values.is_empty() => {
                problems.push(format!(
                    "step `{step}` field `{}` has an empty vocabulary",
                    field.name
                ));
            }
            FieldKind::Records { fields: sub } if sub.is_empty() => {
                problems.push(format!(
                    "step `{step}` field `{}` declares records without sub-fields",
                    field.name
                ));
            }
            _ => {}
        }
    }
}

fn check_fallback(catalog: &StepCatalog, start: &str, problems: &mut Vec<String>) {
    let mut visited = vec![start];
    let mut current = start;
    while let Some(spec) = catalog.step(current) {
        let Some(fallback) = spec.fallback.as_deref() else {
            return;
        };
        let Some(fallback_spec) = catalog.step(fallback) else {
            problems.push(format!(
                "step `{current}` falls back to unknown step `{fallback}`"
            ));
            return;
        };
        if visited.contains(&fallback) {
            // Report the cycle once, from the step that closes it.
            if current == start || fallback == start {
                problems.push(format!(
                    "fallback cycle: {} -> {fallback}",
                    visited.join(" -> ")
                ));
            }
            return;
        }
        if current == start {
            if let Err(reason) = fallback_spec
                .output_schema
                .compatible_as_fallback_for(&spec.output_schema)
            {
                problems.push(format!(
                    "fallback `{fallback}` is incompatible with `{current}`: {reason}"
                ));
            }
        }
        visited.push(fallback);
        current = fallback;
    }
}

fn check_pipeline(catalog: &StepCatalog, problems: &mut Vec<String>) {
    let names = catalog.pipeline_names();
    if names.is_empty() {
        problems.push("pipeline is empty".to_string());
    }

    let mut earlier: BTreeSet<&str> = BTreeSet::new();
    for name in names {
        let Some(step) = catalog.step(name) else {
            problems.push(format!("pipeline names unknown step `{name}`"));
            continue;
        };
        if earlier.contains(name) {
            problems.push(format!("pipeline lists `{name}` more than once"));
            continue;
        }

        // Fallbacks run in the primary's position, so they see the same inputs.
        let mut chain = vec![step];
        let mut next = step.fallback.as_deref();
        while let Some(fallback) = next.and_then(|n| catalog.step(n)) {
            if chain.iter().any(|s| s.name == fallback.name) {
                break;
            }
            chain.push(fallback);
            next = fallback.fallback.as_deref();
        }
        for spec in chain {
            for input in &spec.inputs {
                if !earlier.contains(input.as_str()) {
                    problems.push(format!(
                        "step `{}` reads `{input}`, which is not an earlier pipeline step",
                        spec.name
                    ));
                }
            }
        }
        earlier.insert(name);
    }
}
