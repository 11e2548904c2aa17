//! User-level review configuration.
//!
//! The config only chooses how the engine is wired (backend, timeouts,
//! concurrency, logging). What the pipeline does lives in the step catalog.
use crate::invoker::HttpSettings;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current schema version for config files.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;
/// Environment variable consulted last when resolving the LM command.
/// Upper bound for per-attempt and whole-run time limits (one day).
pub const MAX_TIMEOUT_SECS: u64 = 86_400;
pub const LM_COMMAND_ENV: &str = "STEPGATE_LM_COMMAND";

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a careful code reviewer. Follow the output format exactly and describe only what the code shows.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A local command reading the prompt on stdin.
    #[default]
    Command,
    /// An OpenAI-compatible chat-completions endpoint.
    Http,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub temperature: f32,
    pub system_prompt: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/v1/chat/completions".to_string(),
            model: "llama3".to_string(),
            api_key_env: None,
            temperature: 0.1,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    pub schema_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lm_command: Option<String>,
    pub backend: BackendKind,
    pub http: HttpConfig,
    /// Per-attempt backend timeout.
    pub timeout_secs: u64,
    /// Backend calls allowed in flight at once, across all runs.
    pub max_concurrent_invocations: usize,
    /// Artifacts reviewed in parallel by `batch`.
    pub jobs: usize,
    pub store_raw_output: bool,
    /// Keep full prompts and responses next to `lm_log.jsonl`.
    pub log_content: bool,
    /// Directory of `<template id>.md` files overriding built-in prompts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            schema_version: CONFIG_SCHEMA_VERSION,
            lm_command: None,
            backend: BackendKind::Command,
            http: HttpConfig::default(),
            timeout_secs: 120,
            max_concurrent_invocations: 4,
            jobs: 2,
            store_raw_output: true,
            log_content: false,
            prompts_dir: None,
        }
    }
}

impl ReviewConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// LM command in priority order: flag, config, environment.
    pub fn lm_command(&self, flag: Option<&str>) -> Option<String> {
        flag.map(str::to_string)
            .or_else(|| self.lm_command.clone())
            .or_else(|| env::var(LM_COMMAND_ENV).ok())
            .filter(|command| !command.trim().is_empty())
    }

    /// HTTP backend settings, reading the API key from the environment.
    pub fn http_settings(&self) -> Result<HttpSettings> {
        let api_key = match &self.http.api_key_env {
            Some(var) => Some(
                env::var(var).with_context(|| format!("read API key from ${var}"))?,
            ),
            None => None,
        };
        Ok(HttpSettings {
            endpoint: self.http.endpoint.clone(),
            model: self.http.model.clone(),
            api_key,
            temperature: self.http.temperature,
            system_prompt: self.http.system_prompt.clone(),
        })
    }
}

/// Pretty JSON of the default config, as a starting point for edits.
pub fn config_stub() -> Result<String> {
    serde_json::to_string_pretty(&ReviewConfig::default()).context("serialize config stub")
}

/// `<config dir>/stepgate/config.json`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("stepgate").join("config.json"))
}

pub fn load_config(path: &Path) -> Result<ReviewConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: ReviewConfig = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse config JSON {}", path.display()))?;
    Ok(config)
}

/// Load `explicit` when given, else the user config when present, else
/// defaults. The result is validated either way.
pub fn resolve_config(explicit: Option<&Path>) -> Result<ReviewConfig> {
    let config = match explicit {
        Some(path) => load_config(path)?,
        None => match default_config_path().filter(|path| path.is_file()) {
            Some(path) => {
                tracing::debug!(path = %path.display(), "loading user config");
                load_config(&path)?
            }
            None => ReviewConfig::default(),
        },
    };
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &ReviewConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.timeout_secs == 0 || config.timeout_secs > MAX_TIMEOUT_SECS {
        return Err(anyhow!(
            "timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
        ));
    }
    if config.jobs == 0 {
        return Err(anyhow!("jobs must be at least 1"));
    }
    if config.max_concurrent_invocations == 0 {
        return Err(anyhow!("max_concurrent_invocations must be at least 1"));
    }
    if config.backend == BackendKind::Http && config.http.endpoint.trim().is_empty() {
        return Err(anyhow!("http.endpoint must be non-empty for the http backend"));
    }
    if let Some(dir) = &config.prompts_dir {
        if !dir.is_dir() {
            return Err(anyhow!(
                "prompts_dir {} is not a directory",
                dir.display()
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
