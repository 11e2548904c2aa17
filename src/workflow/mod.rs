//! Command workflows: everything between parsed arguments and the engine.
//!
//! The engine itself writes nothing. Each workflow loads configuration,
//! executes the pipeline, and persists what came out under a run directory.
mod batch;
mod check;
mod gate;
mod lm_log;
mod paths;
mod replay;
mod review;
mod run;
mod runlog;
mod setup;

pub use batch::run_batch;
pub use check::run_check;
pub use gate::run_gate;
pub use replay::run_replay;
pub use run::run_review;

use crate::catalog::BuiltinCatalog;
use crate::cli::CatalogArgs;
use crate::config::config_stub;
use crate::util::now_epoch_ms;
use anyhow::{anyhow, Result};
use std::process::ExitCode;

/// A run ended FAILED, the gate blocked, a replay diverged, or `check` found
/// problems.
pub(crate) const EXIT_FAILED: u8 = 1;
/// Setup or I/O error before any result existed.
pub(crate) const EXIT_ERROR: u8 = 2;
/// `batch --max-risk` was exceeded.
pub(crate) const EXIT_RISK_GATE: u8 = 3;

/// Print a built-in catalog, or the default config with `--config-stub`.
pub fn run_catalog(args: &CatalogArgs) -> Result<ExitCode> {
    if args.config_stub {
        println!("{}", config_stub()?);
    } else {
        print!("{}", BuiltinCatalog::select(args.gate).json());
    }
    Ok(ExitCode::SUCCESS)
}

/// The explicit run id, or `run-<epoch seconds>`.
pub(crate) fn resolve_run_id(explicit: Option<&str>) -> Result<String> {
    match explicit.map(str::trim) {
        Some("") => Err(anyhow!("--run-id must be non-empty")),
        Some(id) if id.contains(['/', '\\']) || id == "." || id == ".." => {
            Err(anyhow!("--run-id must be a plain directory name: {id}"))
        }
        Some(id) => Ok(id.to_string()),
        None => Ok(format!("run-{}", now_epoch_ms()? / 1000)),
    }
}
