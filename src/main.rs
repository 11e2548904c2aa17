//! stepgate: validator-gated, multi-step LM review of source files.
mod artifact;
mod catalog;
mod cli;
mod config;
mod engine;
mod invoker;
mod output;
mod prompts;
mod report;
mod util;
mod validate;
mod workflow;

use clap::Parser;
use cli::{Command, RootArgs};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Overrides the default log filter, e.g. `STEPGATE_LOG=stepgate=debug`.
const LOG_ENV: &str = "STEPGATE_LOG";

fn main() -> ExitCode {
    let args = RootArgs::parse();
    init_logging(verbose(&args.command));

    let outcome = match &args.command {
        Command::Run(args) => workflow::run_review(args),
        Command::Batch(args) => workflow::run_batch(args),
        Command::Gate(args) => workflow::run_gate(args),
        Command::Check(args) => workflow::run_check(args),
        Command::Replay(args) => workflow::run_replay(args),
        Command::Catalog(args) => workflow::run_catalog(args),
    };
    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(workflow::EXIT_ERROR)
        }
    }
}

fn verbose(command: &Command) -> bool {
    match command {
        Command::Run(args) => args.engine.verbose,
        Command::Batch(args) => args.engine.verbose,
        Command::Gate(args) => args.engine.verbose,
        Command::Check(_) | Command::Replay(_) | Command::Catalog(_) => false,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .init();
}
