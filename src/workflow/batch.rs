//! `stepgate batch`: review every matching file under a directory.
//!
//! Each file is an isolated run with its own context and cancel token. Runs
//! share only the worker pool, the in-flight invocation limit, and the
//! append-only logs of the run directory.
use super::lm_log::LmLog;
use super::paths::{output_stem, RunPaths};
use super::review::{print_dry_run, review_artifact, Progress, ReviewSink};
use super::runlog::RunIndex;
use super::setup::ReviewSetup;
use super::{resolve_run_id, EXIT_FAILED, EXIT_RISK_GATE};
use crate::artifact::Artifact;
use crate::catalog::BuiltinCatalog;
use crate::cli::BatchArgs;
use crate::engine::{AttemptObserver, RunStatus};
use crate::invoker::{ModelInvoker, ScriptedInvoker};
use crate::report::{aggregate, write_summary, FailedFile, FileReview, ReviewDigest, RunResult};
use crate::util::{display_path, now_epoch_ms};
use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Where each file's responses come from.
enum Backend {
    Shared(Arc<dyn ModelInvoker>),
    /// `<dir>/<output stem>/NNN.txt` per file.
    Scripted(PathBuf),
}

impl Backend {
    fn for_stem(&self, stem: &str) -> Result<Arc<dyn ModelInvoker>> {
        match self {
            Self::Shared(invoker) => Ok(Arc::clone(invoker)),
            Self::Scripted(dir) => Ok(Arc::new(ScriptedInvoker::from_dir(&dir.join(stem))?)),
        }
    }
}

pub fn run_batch(args: &BatchArgs) -> Result<ExitCode> {
    let setup = ReviewSetup::load(&args.engine, BuiltinCatalog::Review)?;
    let jobs = args.jobs.unwrap_or(setup.config.jobs);
    if jobs == 0 {
        return Err(anyhow!("--jobs must be at least 1"));
    }
    if !args.path.is_dir() {
        return Err(anyhow!("batch path {} is not a directory", args.path.display()));
    }

    let files = discover_files(&args.path, &args.ext)?;
    eprintln!(
        "batch: discovered {} file(s) under {} ({}); {} worker(s), at most {} LM call(s) in flight",
        files.len(),
        args.path.display(),
        args.ext.join(","),
        jobs,
        setup.limit.limit()
    );
    if args.dry_run {
        for file in &files {
            print_dry_run(&setup, &Artifact::load(file)?);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let backend = match &args.engine.responses {
        Some(dir) => Backend::Scripted(dir.clone()),
        None => Backend::Shared(setup.invoker(args.engine.lm.as_deref(), None)?),
    };
    let run_id = resolve_run_id(args.run_id.as_deref())?;
    let paths = RunPaths::new(&args.out, &run_id);
    paths.ensure()?;
    let index = RunIndex::new(paths.index_path());
    let lm_log = LmLog::new(
        &run_id,
        paths.lm_log_path(),
        setup.log_content.then(|| paths.lm_content_dir()),
    );
    let observers: Vec<Arc<dyn AttemptObserver>> = vec![Arc::new(lm_log), Arc::new(Progress)];
    let sink = ReviewSink {
        run_id: &run_id,
        paths: &paths,
        index: &index,
        observers: &observers,
        markdown: !args.no_markdown,
    };

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|idx| format!("stepgate-batch-{idx}"))
        .build()
        .context("build batch worker pool")?;
    let outcomes: Vec<(String, Result<(RunResult, ReviewDigest)>)> = pool.install(|| {
        files
            .par_iter()
            .map(|file| {
                let name = display_path(file, Some(&args.path));
                let outcome = review_file(&setup, &backend, file, &name, &sink);
                (name, outcome)
            })
            .collect()
    });

    let mut reviews = Vec::new();
    let mut failed = Vec::new();
    for (name, outcome) in outcomes {
        match outcome {
            Ok((result, digest)) => {
                if let Some(failure) = &result.failure {
                    failed.push(FailedFile {
                        path: name.clone(),
                        reason: failure.to_string(),
                    });
                }
                reviews.push(FileReview::new(name, &result, digest));
            }
            Err(err) => {
                eprintln!("error: {name}: {err:#}");
                failed.push(FailedFile {
                    path: name,
                    reason: format!("{err:#}"),
                });
            }
        }
    }

    let summary = aggregate(&run_id, now_epoch_ms()?, reviews, failed);
    let (json_path, md_path) = write_summary(paths.run_dir(), &summary)?;
    let completed = summary
        .files
        .iter()
        .filter(|file| file.status == RunStatus::Completed)
        .count();
    eprintln!(
        "batch: run {} reviewed {} file(s), {} completed, {} failed; overall risk {}",
        run_id,
        summary.scanned_files,
        completed,
        summary.failed.len(),
        summary.overall_risk_score
    );
    eprintln!(
        "batch: summary at {} and {}",
        json_path.display(),
        md_path.display()
    );

    if summary.has_failures() {
        return Ok(ExitCode::from(EXIT_FAILED));
    }
    if let Some(max_risk) = args.max_risk {
        if summary.overall_risk_score > max_risk {
            eprintln!(
                "error: overall risk {} exceeds --max-risk {max_risk}",
                summary.overall_risk_score
            );
            return Ok(ExitCode::from(EXIT_RISK_GATE));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn review_file(
    setup: &ReviewSetup,
    backend: &Backend,
    file: &Path,
    name: &str,
    sink: &ReviewSink<'_>,
) -> Result<(RunResult, ReviewDigest)> {
    let text =
        fs::read_to_string(file).with_context(|| format!("read artifact {}", file.display()))?;
    let stem = output_stem(name);
    let invoker = backend.for_stem(&stem)?;
    let artifact = Artifact::new(name, text);
    review_artifact(
        setup,
        artifact,
        file,
        &stem,
        invoker,
        &setup.cancel_token(),
        sink,
    )
}

/// Every file under `root` whose extension is in `extensions`, sorted.
pub(crate) fn discover_files(root: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let wanted: Vec<String> = extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect();
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("read directory {}", dir.display()))?;
        for entry in entries {
            let path = entry
                .with_context(|| format!("read entry in {}", dir.display()))?
                .path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| wanted.contains(&ext.to_ascii_lowercase()));
            if matches {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_is_recursive_sorted_and_filtered() {
        let dir = tempfile::tempdir().expect("temp dir");
        let root = dir.path();
        std::fs::create_dir_all(root.join("pkg/nested")).expect("mkdir");
        for rel in ["b.sql", "a.SQL", "pkg/billing.pkb", "pkg/nested/c.pks", "notes.md"] {
            std::fs::write(root.join(rel), "BEGIN NULL; END;").expect("write");
        }
        let files = discover_files(root, &["sql".to_string(), ".pkb".to_string(), "pks".to_string()])
            .expect("discover");
        let names: Vec<String> = files
            .iter()
            .map(|path| display_path(path, Some(root)))
            .collect();
        assert_eq!(
            names,
            vec!["a.SQL", "b.sql", "pkg/billing.pkb", "pkg/nested/c.pks"]
        );
    }
}
