//! Wiring shared by every command that executes the pipeline.
use super::runlog::RunFlags;
use crate::catalog::{resolve_catalog, BuiltinCatalog, Pipeline, Selection};
use crate::cli::EngineArgs;
use crate::config::{resolve_config, BackendKind, ReviewConfig, LM_COMMAND_ENV, MAX_TIMEOUT_SECS};
use crate::engine::{CancelToken, EngineSettings};
use crate::invoker::{CommandInvoker, HttpInvoker, InvocationLimit, ModelInvoker, ScriptedInvoker};
use crate::prompts::PromptTemplates;
use crate::validate::Validator;
use anyhow::{anyhow, Result};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub(crate) struct ReviewSetup {
    pub(crate) config: ReviewConfig,
    pub(crate) pipeline: Pipeline,
    pub(crate) validator: Validator,
    pub(crate) settings: EngineSettings,
    /// Shared by every run started from this setup.
    pub(crate) limit: InvocationLimit,
    pub(crate) log_content: bool,
    model: Option<String>,
    run_budget: Option<Duration>,
    flags: RunFlags,
}

impl ReviewSetup {
    /// `builtin` is the catalog used when `--catalog` is absent.
    pub(crate) fn load(args: &EngineArgs, builtin: BuiltinCatalog) -> Result<Self> {
        let mut config = resolve_config(args.config.as_deref())?;
        let model = model_override(args.model.as_deref())?;
        if let Some(model) = &model {
            config.http.model = model.clone();
        }
        let templates = match &config.prompts_dir {
            Some(dir) => PromptTemplates::with_overrides(dir)?,
            None => PromptTemplates::builtin(),
        };
        let catalog = resolve_catalog(args.catalog.as_deref(), builtin)?;
        let selection = Selection {
            enable: args.enable.iter().cloned().collect(),
            skip: args.skip.iter().cloned().collect(),
        };
        let pipeline = Pipeline::build(&catalog, &templates, &selection)?;
        let validator = Validator::new(catalog.vocabulary.clone());

        let timeout = match args.timeout_secs {
            Some(secs) => Duration::from_secs(bounded_secs("--timeout-secs", secs)?),
            None => config.timeout(),
        };
        let run_budget = args
            .run_budget_secs
            .map(|secs| bounded_secs("--run-budget-secs", secs).map(Duration::from_secs))
            .transpose()?;
        let settings = EngineSettings {
            timeout,
            store_raw_output: config.store_raw_output,
            ..EngineSettings::default()
        };
        let flags = RunFlags {
            markdown: true,
            skip: args.skip.clone(),
            enable: args.enable.clone(),
            timeout_secs: timeout.as_secs(),
            run_budget_secs: args.run_budget_secs,
            store_raw_output: config.store_raw_output,
            catalog: args
                .catalog
                .as_ref()
                .map(|path| path.display().to_string()),
        };

        Ok(Self {
            limit: InvocationLimit::new(config.max_concurrent_invocations),
            log_content: args.log_content || config.log_content,
            config,
            pipeline,
            validator,
            settings,
            model,
            run_budget,
            flags,
        })
    }

    /// The configured backend, or scripted responses from `responses`.
    pub(crate) fn invoker(
        &self,
        lm_flag: Option<&str>,
        responses: Option<&Path>,
    ) -> Result<Arc<dyn ModelInvoker>> {
        if let Some(dir) = responses {
            return Ok(Arc::new(ScriptedInvoker::from_dir(dir)?));
        }
        match self.config.backend {
            BackendKind::Command => {
                let command = self.config.lm_command(lm_flag).ok_or_else(|| {
                    anyhow!(
                        "no LM command: pass --lm, set lm_command in the config, or set {LM_COMMAND_ENV}"
                    )
                })?;
                Ok(Arc::new(
                    CommandInvoker::new(&command)?.with_model(self.model.clone()),
                ))
            }
            BackendKind::Http => Ok(Arc::new(HttpInvoker::new(self.config.http_settings()?))),
        }
    }

    /// A fresh token per run, tripped by the run budget when one is set.
    pub(crate) fn cancel_token(&self) -> CancelToken {
        let token = CancelToken::new();
        if let Some(budget) = self.run_budget {
            token.cancel_after(budget);
        }
        token
    }

    pub(crate) fn flags(&self, markdown: bool) -> RunFlags {
        RunFlags {
            markdown,
            ..self.flags.clone()
        }
    }
}

fn model_override(flag: Option<&str>) -> Result<Option<String>> {
    match flag.map(str::trim) {
        Some("") => Err(anyhow!("--model must be non-empty")),
        other => Ok(other.map(str::to_string)),
    }
}

fn bounded_secs(flag: &str, secs: u64) -> Result<u64> {
    if secs == 0 || secs > MAX_TIMEOUT_SECS {
        return Err(anyhow!("{flag} must be between 1 and {MAX_TIMEOUT_SECS}"));
    }
    Ok(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_flag_is_trimmed_and_must_be_non_empty() {
        assert_eq!(model_override(None).expect("no flag"), None);
        assert_eq!(
            model_override(Some(" gpt-4.1-mini ")).expect("model"),
            Some("gpt-4.1-mini".to_string())
        );
        assert!(model_override(Some("  ")).is_err());
    }

    #[test]
    fn model_flag_replaces_http_model() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"backend": "http", "http": {"model": "llama3"}}"#)
            .expect("write config");
        let args = EngineArgs {
            model: Some("qwen2".to_string()),
            config: Some(path),
            ..EngineArgs::default()
        };
        let setup = ReviewSetup::load(&args, BuiltinCatalog::Review).expect("setup");
        assert_eq!(setup.config.http.model, "qwen2");
        let settings = setup.config.http_settings().expect("http settings");
        assert_eq!(settings.model, "qwen2");
    }

    #[test]
    fn time_limits_are_bounded() {
        assert_eq!(bounded_secs("--timeout-secs", 30).expect("in range"), 30);
        for secs in [0, MAX_TIMEOUT_SECS + 1, u64::MAX] {
            let err = bounded_secs("--timeout-secs", secs).expect_err("out of range");
            assert!(err.to_string().contains("--timeout-secs must be between 1"));
        }
    }
}
