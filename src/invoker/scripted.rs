//! Pre-recorded responses, returned in order.
//!
//! Used by tests and by offline runs (`--responses DIR`). A response whose
//! text is `!timeout` plays back as a backend timeout; one starting with
//! `!unavailable` plays back as an unavailable backend.
use super::{BackendError, ModelInvoker};
use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

const TIMEOUT_DIRECTIVE: &str = "!timeout";
const UNAVAILABLE_DIRECTIVE: &str = "!unavailable";

pub struct ScriptedInvoker {
    label: String,
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedInvoker {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: "scripted".to_string(),
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Every `*.txt` file in `dir`, in file-name order.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("read responses dir {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("txt"))
            .collect();
        files.sort();
        let mut responses = Vec::with_capacity(files.len());
        for path in &files {
            let text = fs::read_to_string(path)
                .with_context(|| format!("read scripted response {}", path.display()))?;
            responses.push(text);
        }
        let mut invoker = Self::new(responses);
        invoker.label = format!("scripted: {}", dir.display());
        Ok(invoker)
    }

    /// Prompts received so far, oldest first.
    #[cfg(test)]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[cfg(test)]
    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ModelInvoker for ScriptedInvoker {
    fn invoke(&self, prompt: &str, timeout: Duration) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(prompt.to_string());
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(response) = next else {
            return Err(BackendError::Unavailable(
                "no scripted response left".to_string(),
            ));
        };
        let directive = response.trim();
        if directive == TIMEOUT_DIRECTIVE {
            return Err(BackendError::Timeout(timeout));
        }
        if let Some(reason) = directive.strip_prefix(UNAVAILABLE_DIRECTIVE) {
            return Err(BackendError::Unavailable(reason.trim().to_string()));
        }
        Ok(response)
    }

    fn describe(&self) -> String {
        self.label.clone()
    }
}
