//! Batch-level aggregate over many isolated runs.
use super::digest::{ReviewDigest, Severity};
use super::RunResult;
use crate::engine::RunStatus;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Per-file line of a batch summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReview {
    pub path: String,
    pub status: RunStatus,
    pub risk_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub issues: Vec<super::Issue>,
    pub refactor_suggestions: Vec<String>,
    pub checklist_items: Vec<String>,
}

impl FileReview {
    pub fn new(path: String, result: &RunResult, digest: ReviewDigest) -> Self {
        Self {
            path,
            status: result.status,
            risk_score: digest.risk_score,
            summary: digest.summary,
            issues: digest.issues,
            refactor_suggestions: digest.suggestions,
            checklist_items: digest.checklist,
        }
    }
}

/// A file whose run failed or never produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedFlag {
    pub file: String,
    pub severity: Severity,
    pub category: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub timestamp_epoch_ms: u128,
    pub scanned_files: usize,
    pub overall_risk_score: u32,
    pub red_flags: Vec<RedFlag>,
    pub checklist: Vec<String>,
    pub files: Vec<FileReview>,
    pub failed: Vec<FailedFile>,
}

impl BatchSummary {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// Fold per-file reviews into one summary. Files that never produced a
/// result count as scanned but not toward the risk mean.
pub fn aggregate(
    run_id: &str,
    timestamp_epoch_ms: u128,
    files: Vec<FileReview>,
    failed: Vec<FailedFile>,
) -> BatchSummary {
    let scored = files.len() as u32;
    let overall_risk_score = if scored == 0 {
        0
    } else {
        let total: u32 = files.iter().map(|file| file.risk_score).sum();
        (f64::from(total) / f64::from(scored)).round() as u32
    };

    let mut red_flags = Vec::new();
    let mut checklist: Vec<String> = Vec::new();
    for file in &files {
        red_flags.extend(
            file.issues
                .iter()
                .filter(|issue| issue.severity.is_red_flag())
                .map(|issue| RedFlag {
                    file: file.path.clone(),
                    severity: issue.severity,
                    category: issue.category.clone(),
                    message: issue.message.clone(),
                }),
        );
        for item in &file.checklist_items {
            if !checklist.contains(item) {
                checklist.push(item.clone());
            }
        }
    }

    let produced: Vec<&str> = files.iter().map(|file| file.path.as_str()).collect();
    let errored = failed
        .iter()
        .filter(|failure| !produced.contains(&failure.path.as_str()))
        .count();

    BatchSummary {
        run_id: run_id.to_string(),
        timestamp_epoch_ms,
        scanned_files: files.len() + errored,
        overall_risk_score,
        red_flags,
        checklist,
        files,
        failed,
    }
}

pub fn render_summary(summary: &BatchSummary) -> String {
    let mut out = String::new();
    out.push_str("# Review Summary\n\n");
    out.push_str(&format!("- Run ID: `{}`\n", summary.run_id));
    out.push_str(&format!("- Files scanned: **{}**\n", summary.scanned_files));
    out.push_str(&format!(
        "- Overall risk score: **{}** / 100\n\n",
        summary.overall_risk_score
    ));

    if !summary.failed.is_empty() {
        out.push_str("## Failed Runs\n\n");
        for failed in &summary.failed {
            out.push_str(&format!("- `{}`: {}\n", failed.path, failed.reason));
        }
        out.push('\n');
    }

    if !summary.red_flags.is_empty() {
        out.push_str("## Red Flags (High/Critical)\n\n");
        for flag in &summary.red_flags {
            out.push_str(&format!(
                "- **{}** in `{}` ({}): {}\n",
                flag.severity.to_string().to_uppercase(),
                flag.file,
                flag.category,
                flag.message
            ));
        }
        out.push('\n');
    }

    if !summary.checklist.is_empty() {
        out.push_str("## Review Checklist\n\n");
        for item in &summary.checklist {
            out.push_str(&format!("- [ ] {item}\n"));
        }
        out.push('\n');
    }

    if !summary.files.is_empty() {
        out.push_str("## Per-File Highlights\n\n");
        for file in &summary.files {
            out.push_str(&format!(
                "### `{}` ({}, risk {})\n\n",
                file.path, file.status, file.risk_score
            ));
            if let Some(text) = &file.summary {
                out.push_str(&format!("**Summary:** {}\n\n", text.trim()));
            }
            if !file.issues.is_empty() {
                out.push_str("**Issues:**\n");
                for issue in &file.issues {
                    out.push_str(&format!(
                        "- {} {}: {}\n",
                        issue.severity.to_string().to_uppercase(),
                        issue.category,
                        issue.message
                    ));
                }
                out.push('\n');
            }
            if !file.refactor_suggestions.is_empty() {
                out.push_str("**Refactor Suggestions:**\n");
                for suggestion in &file.refactor_suggestions {
                    out.push_str(&format!("- {suggestion}\n"));
                }
                out.push('\n');
            }
        }
    }
    out
}

/// Write `summary.json` and `summary.md` into `dir`.
pub fn write_summary(dir: &Path, summary: &BatchSummary) -> Result<(PathBuf, PathBuf)> {
    fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    let json_path = dir.join("summary.json");
    let text = serde_json::to_string_pretty(summary).context("serialize batch summary")?;
    fs::write(&json_path, text.as_bytes())
        .with_context(|| format!("write {}", json_path.display()))?;
    let md_path = dir.join("summary.md");
    fs::write(&md_path, render_summary(summary).as_bytes())
        .with_context(|| format!("write {}", md_path.display()))?;
    Ok((json_path, md_path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Issue;

    fn review(path: &str, risk: u32, issues: Vec<Issue>, checklist: &[&str]) -> FileReview {
        FileReview {
            path: path.to_string(),
            status: RunStatus::Completed,
            risk_score: risk,
            summary: Some(format!("summary of {path}")),
            issues,
            refactor_suggestions: Vec::new(),
            checklist_items: checklist.iter().map(|item| item.to_string()).collect(),
        }
    }

    fn issue(severity: Severity, message: &str) -> Issue {
        Issue {
            category: "security".to_string(),
            severity,
            message: message.to_string(),
        }
    }

    #[test]
    fn empty_batch_scores_zero() {
        let summary = aggregate("run-1", 0, Vec::new(), Vec::new());
        assert_eq!(summary.scanned_files, 0);
        assert_eq!(summary.overall_risk_score, 0);
        assert!(!summary.has_failures());
    }

    #[test]
    fn mean_is_rounded_and_red_flags_collected() {
        let summary = aggregate(
            "run-1",
            0,
            vec![
                review(
                    "a.sql",
                    40,
                    vec![issue(Severity::Critical, "injection"), issue(Severity::Low, "naming")],
                    &["Review: NULL handling"],
                ),
                review("b.sql", 15, vec![issue(Severity::High, "no handler")], &["Review: NULL handling", "Clarify: owner"]),
            ],
            Vec::new(),
        );
        assert_eq!(summary.overall_risk_score, 28);
        assert_eq!(summary.red_flags.len(), 2);
        assert_eq!(summary.red_flags[0].file, "a.sql");
        assert_eq!(summary.red_flags[1].severity, Severity::High);
        assert_eq!(summary.checklist, vec!["Review: NULL handling", "Clarify: owner"]);
    }

    #[test]
    fn errored_files_count_as_scanned_but_not_scored() {
        let mut failed_run = review("b.sql", 0, Vec::new(), &[]);
        failed_run.status = RunStatus::Failed;
        let summary = aggregate(
            "run-1",
            0,
            vec![review("a.sql", 20, Vec::new(), &[]), failed_run],
            vec![
                FailedFile {
                    path: "b.sql".to_string(),
                    reason: "required step `summary` failed".to_string(),
                },
                FailedFile {
                    path: "c.sql".to_string(),
                    reason: "read artifact c.sql".to_string(),
                },
            ],
        );
        assert_eq!(summary.scanned_files, 3);
        assert_eq!(summary.overall_risk_score, 10);
        assert!(summary.has_failures());
    }

    #[test]
    fn written_summary_has_both_documents() {
        let summary = aggregate(
            "run-7",
            0,
            vec![review("a.sql", 50, vec![issue(Severity::High, "no handler")], &[])],
            Vec::new(),
        );
        let dir = tempfile::tempdir().expect("temp dir");
        let (json_path, md_path) = write_summary(dir.path(), &summary).expect("write summary");
        let loaded: BatchSummary =
            serde_json::from_slice(&std::fs::read(json_path).expect("read json")).expect("parse");
        assert_eq!(loaded, summary);
        let markdown = std::fs::read_to_string(md_path).expect("read md");
        assert!(markdown.contains("- Run ID: `run-7`"));
        assert!(markdown.contains("- **HIGH** in `a.sql` (security): no handler"));
        assert!(markdown.contains("### `a.sql` (COMPLETED, risk 50)"));
    }
}
