//! CLI argument parsing for the review workflow.
//!
//! The CLI only wires inputs to the engine; retry policy, schemas and
//! vocabulary all come from the step catalog.
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Extensions reviewed by `batch` when `--ext` is not given.
pub const DEFAULT_EXTENSIONS: &str = "sql,pks,pkb,pls,plb,prc,fnc,trg";

#[derive(Parser, Debug)]
#[command(
    name = "stepgate",
    version,
    about = "Validator-gated multi-step LM review of source files",
    after_help = "Commands:\n  run --artifact <file>   Review one file (writes <out>/<run id>/<stem>.run.json)\n  batch --path <dir>      Review every matching file and write summary.json/summary.md\n  gate --log <file>       Decide from a CI log whether to deploy (writes ai-ci-gate.json)\n  check                   Validate the step catalog, config, and LM command\n  replay --run-result <f> Re-validate recorded raw outputs against the catalog\n  catalog                 Print the built-in step catalog\n\nExit codes:\n  0 completed, 1 a run failed or the gate blocked, 2 usage or I/O error, 3 risk gate exceeded\n\nExamples:\n  stepgate run --artifact src/get_invoice.sql --lm \"ollama run llama3\"\n  stepgate batch --path db/ --jobs 4 --max-risk 60\n  stepgate run --artifact a.sql --dry-run --enable refactor\n  stepgate gate --log ci/sqlcl.log --out ci",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct RootArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    Run(RunArgs),
    Batch(BatchArgs),
    Gate(GateArgs),
    Check(CheckArgs),
    Replay(ReplayArgs),
    Catalog(CatalogArgs),
}

/// Inputs shared by every command that executes the pipeline.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Step catalog JSON (default: built-in catalog)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Review config JSON (default: <config dir>/stepgate/config.json when present)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// LM command; the prompt is written to its stdin
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,

    /// Model for this run: replaces http.model, or is exported to the LM
    /// command as STEPGATE_MODEL
    #[arg(long, value_name = "NAME")]
    pub model: Option<String>,

    /// Replay scripted responses (NNN.txt) instead of calling a backend
    #[arg(long, value_name = "DIR")]
    pub responses: Option<PathBuf>,

    /// Per-attempt backend timeout (overrides config)
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Cancel a run that is still going after this many seconds
    #[arg(long, value_name = "SECS")]
    pub run_budget_secs: Option<u64>,

    /// Disable a pipeline step for this run (repeatable, comma-separated)
    #[arg(long, value_name = "STEP", value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Enable a step the catalog disables (repeatable, comma-separated)
    #[arg(long, value_name = "STEP", value_delimiter = ',')]
    pub enable: Vec<String>,

    /// Store full prompts and responses next to lm_log.jsonl
    #[arg(long)]
    pub log_content: bool,

    /// Log engine progress at info level
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Review a single source file")]
pub struct RunArgs {
    /// Source file to review
    #[arg(long, value_name = "FILE")]
    pub artifact: PathBuf,

    /// Output root; results land in <out>/<run id>/
    #[arg(long, value_name = "DIR", default_value = "reviews")]
    pub out: PathBuf,

    /// Explicit run id (default: run-<epoch seconds>)
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Print every composed prompt; make no calls and write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip the Markdown report
    #[arg(long)]
    pub no_markdown: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Review every matching file under a directory")]
pub struct BatchArgs {
    /// Directory searched recursively
    #[arg(long, value_name = "DIR")]
    pub path: PathBuf,

    /// File extensions to review (comma-separated)
    #[arg(long, value_name = "EXT", value_delimiter = ',', default_value = DEFAULT_EXTENSIONS)]
    pub ext: Vec<String>,

    /// Artifacts reviewed in parallel (overrides config)
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Exit 3 when the overall risk score exceeds this value
    #[arg(long, value_name = "N")]
    pub max_risk: Option<u32>,

    /// Output root; results land in <out>/<run id>/
    #[arg(long, value_name = "DIR", default_value = "reviews")]
    pub out: PathBuf,

    /// Explicit run id (default: run-<epoch seconds>)
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Print every composed prompt; make no calls and write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Skip per-file Markdown reports
    #[arg(long)]
    pub no_markdown: bool,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Decide from a CI log whether a deploy may proceed")]
pub struct GateArgs {
    /// CI log to review (e.g. SQLcl or test runner output)
    #[arg(long, value_name = "FILE")]
    pub log: PathBuf,

    /// Output root; the verdict lands in <out>/<run id>/ai-ci-gate.json
    #[arg(long, value_name = "DIR", default_value = "reviews")]
    pub out: PathBuf,

    /// Explicit run id (default: run-<epoch seconds>)
    #[arg(long, value_name = "ID")]
    pub run_id: Option<String>,

    /// Print the composed prompt; make no calls and write nothing
    #[arg(long)]
    pub dry_run: bool,

    // `--catalog` replaces the built-in gate catalog.
    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(Parser, Debug)]
#[command(about = "Validate the step catalog, config, and LM command")]
pub struct CheckArgs {
    /// Step catalog JSON (default: built-in catalog)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Check the built-in gate catalog instead of the review catalog
    #[arg(long, conflicts_with = "catalog")]
    pub gate: bool,

    /// Review config JSON
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// LM command to resolve on PATH
    #[arg(long, value_name = "CMD")]
    pub lm: Option<String>,
}

#[derive(Parser, Debug)]
#[command(about = "Re-validate the raw outputs recorded in a run result")]
pub struct ReplayArgs {
    /// A <stem>.run.json written by `run` or `batch`
    #[arg(long, value_name = "FILE")]
    pub run_result: PathBuf,

    /// The source file the run reviewed
    #[arg(long, value_name = "FILE")]
    pub artifact: PathBuf,

    /// Step catalog JSON used for the run (default: built-in catalog)
    #[arg(long, value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// The run was a `gate` run with the built-in gate catalog
    #[arg(long, conflicts_with = "catalog")]
    pub gate: bool,
}

#[derive(Parser, Debug)]
#[command(about = "Print the built-in step catalog")]
pub struct CatalogArgs {
    /// Print a default config file instead
    #[arg(long)]
    pub config_stub: bool,

    /// Print the built-in gate catalog
    #[arg(long, conflicts_with = "config_stub")]
    pub gate: bool,
}
