//! Typed paths into a run's output directory.
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Layout of `<out>/<run id>/`.
#[derive(Debug, Clone)]
pub(crate) struct RunPaths {
    run_dir: PathBuf,
}

impl RunPaths {
    pub(crate) fn new(out: &Path, run_id: &str) -> Self {
        Self {
            run_dir: out.join(run_id),
        }
    }

    pub(crate) fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub(crate) fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.run_dir)
            .with_context(|| format!("create run directory {}", self.run_dir.display()))
    }

    /// Return the `<stem>.run.json` path.
    pub(crate) fn run_result_path(&self, stem: &str) -> PathBuf {
        self.run_dir.join(format!("{stem}.run.json"))
    }

    /// Return the `<stem>.review.md` path.
    pub(crate) fn review_path(&self, stem: &str) -> PathBuf {
        self.run_dir.join(format!("{stem}.review.md"))
    }

    /// Return the `<stem>.refactor.sql` path.
    pub(crate) fn refactor_path(&self, stem: &str) -> PathBuf {
        self.run_dir.join(format!("{stem}.refactor.sql"))
    }

    /// Return the `<stem>.runlog.json` path.
    pub(crate) fn runlog_path(&self, stem: &str) -> PathBuf {
        self.run_dir.join(format!("{stem}.runlog.json"))
    }

    /// Return the `ai-ci-gate.json` verdict path.
    pub(crate) fn gate_verdict_path(&self) -> PathBuf {
        self.run_dir.join("ai-ci-gate.json")
    }

    pub(crate) fn index_path(&self) -> PathBuf {
        self.run_dir.join("index.jsonl")
    }

    pub(crate) fn lm_log_path(&self) -> PathBuf {
        self.run_dir.join("lm_log.jsonl")
    }

    /// Return the `lm_log/` directory for full prompt/response storage.
    pub(crate) fn lm_content_dir(&self) -> PathBuf {
        self.run_dir.join("lm_log")
    }
}

/// Output file stem for an artifact shown as `name`: `pkg/billing.pkb`
/// becomes `pkg__billing`, so files with the same stem in different
/// directories never overwrite each other.
pub(crate) fn output_stem(name: &str) -> String {
    let path = Path::new(name);
    let without_ext = match (path.parent(), path.file_stem().and_then(|stem| stem.to_str())) {
        (Some(parent), Some(stem)) if !parent.as_os_str().is_empty() => {
            parent.join(stem).to_string_lossy().into_owned()
        }
        (_, Some(stem)) => stem.to_string(),
        _ => name.to_string(),
    };
    without_ext.replace(['/', '\\'], "__")
}
