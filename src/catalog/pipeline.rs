//! Resolved execution plan for one catalog.
//!
//! Building a pipeline validates the catalog, applies CLI enable/skip
//! selections, and resolves every template up front, so the engine never
//! meets a dangling reference mid-run.
use super::{validate_catalog, StepCatalog, StepSpec, Vocabulary};
use crate::prompts::PromptTemplates;
use anyhow::{anyhow, Result};
use std::collections::BTreeSet;

/// Step names toggled from the command line.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub enable: BTreeSet<String>,
    pub skip: BTreeSet<String>,
}

/// A step spec paired with its template text.
#[derive(Debug, Clone)]
pub struct ResolvedStep {
    pub spec: StepSpec,
    pub template: String,
}

/// One declared pipeline position: the primary step and its fallback chain.
#[derive(Debug, Clone)]
pub struct Stage {
    chain: Vec<ResolvedStep>,
    enabled: bool,
}

impl Stage {
    pub fn primary(&self) -> &ResolvedStep {
        &self.chain[0]
    }

    pub fn name(&self) -> &str {
        &self.chain[0].spec.name
    }

    /// Primary first, then fallbacks in the order they are tried.
    pub fn chain(&self) -> &[ResolvedStep] {
        &self.chain
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    vocabulary: Vocabulary,
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn build(
        catalog: &StepCatalog,
        templates: &PromptTemplates,
        selection: &Selection,
    ) -> Result<Self> {
        validate_catalog(catalog, templates)?;
        for name in selection.enable.iter().chain(selection.skip.iter()) {
            if !catalog.pipeline_names().contains(&name.as_str()) {
                return Err(anyhow!("`{name}` is not a pipeline step of this catalog"));
            }
        }

        let mut stages = Vec::new();
        for name in catalog.pipeline_names() {
            let mut chain = Vec::new();
            let mut next = Some(name);
            while let Some(step_name) = next {
                let spec = catalog
                    .step(step_name)
                    .ok_or_else(|| anyhow!("unknown step `{step_name}`"))?;
                let template = templates
                    .get(&spec.prompt_template)
                    .ok_or_else(|| anyhow!("unknown prompt template `{}`", spec.prompt_template))?;
                chain.push(ResolvedStep {
                    spec: spec.clone(),
                    template: template.to_string(),
                });
                next = spec.fallback.as_deref();
            }
            let primary = &chain[0].spec;
            let enabled = !selection.skip.contains(name)
                && (primary.enabled || selection.enable.contains(name));
            stages.push(Stage { chain, enabled });
        }

        Ok(Self {
            vocabulary: catalog.vocabulary.clone(),
            stages,
        })
    }

    pub fn vocabulary(&self) -> &Vocabulary {
        &self.vocabulary
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Every step name reachable from this pipeline, fallbacks included.
    #[cfg(test)]
    pub fn step_names(&self) -> BTreeSet<&str> {
        self.stages
            .iter()
            .flat_map(|stage| stage.chain.iter().map(|step| step.spec.name.as_str()))
            .collect()
    }
}
