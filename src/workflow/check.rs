//! `stepgate check`: validate configuration without reviewing anything.
use super::EXIT_FAILED;
use crate::catalog::{catalog_problems, resolve_catalog, BuiltinCatalog};
use crate::cli::CheckArgs;
use crate::config::{resolve_config, BackendKind, ReviewConfig, LM_COMMAND_ENV};
use crate::invoker::CommandInvoker;
use crate::prompts::PromptTemplates;
use anyhow::Result;
use std::process::ExitCode;

pub fn run_check(args: &CheckArgs) -> Result<ExitCode> {
    let mut problems = Vec::new();

    let config = match resolve_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            problems.push(format!("config: {err:#}"));
            ReviewConfig::default()
        }
    };
    let templates = match &config.prompts_dir {
        Some(dir) => match PromptTemplates::with_overrides(dir) {
            Ok(templates) => templates,
            Err(err) => {
                problems.push(format!("prompts: {err:#}"));
                PromptTemplates::builtin()
            }
        },
        None => PromptTemplates::builtin(),
    };
    let builtin = BuiltinCatalog::select(args.gate);
    let source = args
        .catalog
        .as_ref()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| format!("built-in {}", builtin.name()));
    match resolve_catalog(args.catalog.as_deref(), builtin) {
        Ok(catalog) => {
            problems.extend(
                catalog_problems(&catalog, &templates)
                    .into_iter()
                    .map(|problem| format!("catalog: {problem}")),
            );
            println!(
                "catalog: {source}, {} step(s), pipeline {}",
                catalog.steps.len(),
                catalog.pipeline_names().join(" -> ")
            );
        }
        Err(err) => problems.push(format!("catalog: {err:#}")),
    }

    match config.backend {
        BackendKind::Command => match config.lm_command(args.lm.as_deref()) {
            Some(command) => match CommandInvoker::new(&command) {
                Ok(invoker) => match which::which(invoker.program()) {
                    Ok(resolved) => println!("backend: command {}", resolved.display()),
                    Err(err) => problems.push(format!(
                        "backend: LM program `{}` not found: {err}",
                        invoker.program()
                    )),
                },
                Err(err) => problems.push(format!("backend: {err:#}")),
            },
            None => println!(
                "backend: no LM command configured (pass --lm, set lm_command, or set {LM_COMMAND_ENV})"
            ),
        },
        BackendKind::Http => match config.http_settings() {
            Ok(settings) => println!("backend: http {} ({})", settings.endpoint, settings.model),
            Err(err) => problems.push(format!("backend: {err:#}")),
        },
    }

    if problems.is_empty() {
        println!("check: ok");
        return Ok(ExitCode::SUCCESS);
    }
    for problem in &problems {
        eprintln!("problem: {problem}");
    }
    eprintln!("check: {} problem(s)", problems.len());
    Ok(ExitCode::from(EXIT_FAILED))
}
