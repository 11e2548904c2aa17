//! Human-readable review document for one run.
use super::digest::{Issue, ReviewDigest};
use super::RunResult;
use crate::engine::StepState;

/// Category ids paired with their section titles, in display order.
const CATEGORY_SECTIONS: &[(&str, &str)] = &[
    ("performance", "Performance"),
    ("error_handling", "Error Handling"),
    ("logic_correctness", "Logic Correctness"),
    ("maintainability", "Maintainability"),
    ("security", "Security"),
    ("data_integrity", "Data Integrity"),
    ("uncertainty", "Uncertainty / Open Questions"),
];

pub fn render_review(result: &RunResult, digest: &ReviewDigest) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Code Review: {}\n\n", result.artifact.name));
    out.push_str(&format!("- Status: **{}**\n", result.status));
    out.push_str(&format!("- Risk score: **{}** / 100\n", digest.risk_score));
    out.push_str(&format!("- Input SHA-256: `{}`\n", result.artifact.sha256));
    if let Some(failure) = &result.failure {
        out.push_str(&format!("- Failure: {failure}\n"));
    }
    out.push('\n');

    out.push_str("## Summary\n\n");
    match &digest.summary {
        Some(summary) => out.push_str(&format!("{}\n\n", summary.trim())),
        None => out.push_str("*(no accepted summary)*\n\n"),
    }

    out.push_str("## Issue Categories\n\n");
    if digest.classified {
        for (category, title) in CATEGORY_SECTIONS {
            let issues: Vec<&Issue> = digest.issues_in(category).collect();
            push_issue_section(&mut out, title, &issues);
        }
        let other: Vec<&Issue> = digest
            .issues
            .iter()
            .filter(|issue| {
                !CATEGORY_SECTIONS
                    .iter()
                    .any(|(category, _)| *category == issue.category)
            })
            .collect();
        if !other.is_empty() {
            push_issue_section(&mut out, "Other", &other);
        }
    } else {
        out.push_str("*(no accepted classification)*\n\n");
    }

    push_list_section(&mut out, "Risks", &digest.risks, "*(none explicitly identified)*");
    push_list_section(
        &mut out,
        "Assumptions",
        &digest.assumptions,
        "*(none explicitly identified)*",
    );
    push_list_section(
        &mut out,
        "Refactor Suggestions",
        &digest.suggestions,
        "*(none suggested)*",
    );

    if !digest.checklist.is_empty() {
        out.push_str("## Review Checklist\n\n");
        for item in &digest.checklist {
            out.push_str(&format!("- [ ] {item}\n"));
        }
        out.push('\n');
    }

    if let Some(code) = &digest.refactored_code {
        out.push_str("## Refactored Code\n\n```sql\n");
        out.push_str(code.trim_end());
        out.push_str("\n```\n\n");
    }

    out.push_str("## Pipeline\n\n");
    out.push_str("| Step | State | Accepted by | Attempts | Fallbacks | Last rejection |\n");
    out.push_str("| --- | --- | --- | --- | --- | --- |\n");
    for outcome in &result.steps {
        let rejection = match (&outcome.last_rejection, outcome.state) {
            (Some(rejection), state) if state != StepState::Accepted => {
                escape_cell(&rejection.to_string())
            }
            _ => String::new(),
        };
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} | {} |\n",
            outcome.step,
            outcome.state,
            outcome.accepted_by.as_deref().unwrap_or("-"),
            outcome.attempts,
            outcome.fallbacks_used,
            rejection
        ));
    }
    out
}

fn push_issue_section(out: &mut String, title: &str, issues: &[&Issue]) {
    out.push_str(&format!("### {title}\n\n"));
    if issues.is_empty() {
        out.push_str("- *(none detected)*\n\n");
        return;
    }
    for issue in issues {
        out.push_str(&format!(
            "- **{}** {}\n",
            issue.severity.to_string().to_uppercase(),
            issue.message
        ));
    }
    out.push('\n');
}

fn push_list_section(out: &mut String, title: &str, items: &[String], empty: &str) {
    out.push_str(&format!("## {title}\n\n"));
    if items.is_empty() {
        out.push_str(&format!("- {empty}\n"));
    }
    for item in items {
        out.push_str(&format!("- {item}\n"));
    }
    out.push('\n');
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::Artifact;
    use crate::catalog::Criticality;
    use crate::engine::{RunFailure, RunStatus, StepOutcome};
    use crate::output::{FieldValue, StructuredOutput};
    use crate::report::RUN_RESULT_SCHEMA_VERSION;
    use crate::validate::{Rejection, RejectionKind};
    use std::collections::BTreeMap;

    fn accepted(step: &str) -> StepOutcome {
        StepOutcome {
            accepted_by: Some(step.to_string()),
            attempts: 1,
            ..StepOutcome::untouched(step, Criticality::Optional, StepState::Accepted)
        }
    }

    fn base_result() -> RunResult {
        RunResult {
            schema_version: RUN_RESULT_SCHEMA_VERSION,
            artifact: Artifact::new("get_invoice.sql", "x").id().clone(),
            status: RunStatus::Completed,
            failure: None,
            steps: vec![accepted("summary")],
            accepted: BTreeMap::from([(
                "summary".to_string(),
                StructuredOutput::single("text", "Reads one invoice.".to_string()),
            )]),
            audit_trail: Vec::new(),
        }
    }

    #[test]
    fn renders_sections_with_placeholders() {
        let result = base_result();
        let report = render_review(&result, &ReviewDigest::from_result(&result));
        assert!(report.starts_with("# Code Review: get_invoice.sql\n"));
        assert!(report.contains("## Summary\n\nReads one invoice.\n"));
        assert!(report.contains("*(no accepted classification)*"));
        assert!(report.contains("## Risks\n\n- *(none explicitly identified)*\n"));
        assert!(report.contains("| summary | ACCEPTED | summary | 1 | 0 |  |"));
        assert!(!report.contains("## Review Checklist"));
    }

    #[test]
    fn issues_are_grouped_by_category() {
        let mut result = base_result();
        result.steps.push(accepted("classification"));
        let records = vec![
            BTreeMap::from([
                ("category".to_string(), "security".to_string()),
                ("severity".to_string(), "high".to_string()),
                ("message".to_string(), "dynamic SQL built from p_filter".to_string()),
            ]),
            BTreeMap::from([
                ("category".to_string(), "UNKNOWN".to_string()),
                ("message".to_string(), "unclear caller".to_string()),
            ]),
        ];
        result.accepted.insert(
            "classification".to_string(),
            StructuredOutput::new(BTreeMap::from([(
                "issues".to_string(),
                FieldValue::Records(records),
            )])),
        );
        let report = render_review(&result, &ReviewDigest::from_result(&result));
        assert!(report.contains("### Security\n\n- **HIGH** dynamic SQL built from p_filter\n"));
        assert!(report.contains("### Performance\n\n- *(none detected)*\n"));
        assert!(report.contains("### Other\n\n- **MEDIUM** unclear caller\n"));
    }

    #[test]
    fn failed_run_shows_failure_and_last_rejection() {
        let mut result = base_result();
        let rejection = Rejection::new(RejectionKind::Ungrounded, "mentions `orders_table`");
        result.status = RunStatus::Failed;
        result.accepted.clear();
        result.steps = vec![StepOutcome {
            attempts: 3,
            last_rejection: Some(rejection.clone()),
            ..StepOutcome::untouched("summary", Criticality::Required, StepState::StepFailed)
        }];
        result.failure = Some(RunFailure::StepFailed {
            step: "summary".to_string(),
            last_rejection: rejection,
            attempts: 3,
            fallbacks_exhausted: 0,
        });
        let report = render_review(&result, &ReviewDigest::from_result(&result));
        assert!(report.contains("- Status: **FAILED**"));
        assert!(report.contains("- Failure: required step `summary` failed after 3 attempt(s)"));
        assert!(report.contains("*(no accepted summary)*"));
        assert!(report.contains("| summary | STEP_FAILED | - | 3 | 0 | UNGROUNDED: mentions `orders_table` |"));
    }
}
