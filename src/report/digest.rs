//! Review-level facts derived from accepted outputs.
//!
//! The digest reads outputs by field name, never by step name, so a catalog
//! that renames its steps still yields issues, risks and a score.
use super::RunResult;
use crate::catalog::{CODE_FIELD, TEXT_FIELD};
use crate::output::FieldValue;
use serde::{Deserialize, Serialize};
use std::fmt;

const SUMMARY_FIELD: &str = "summary";
const RISKS_FIELD: &str = "risks";
const ASSUMPTIONS_FIELD: &str = "assumptions";
const SUGGESTIONS_FIELD: &str = "suggestions";
/// Issue category whose items become clarification checklist entries.
pub const UNCERTAINTY_CATEGORY: &str = "uncertainty";
const MAX_RISK_SCORE: u32 = 100;
const RISK_WEIGHT: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Anything unrecognized, including the uncertainty marker, counts as medium.
    pub fn normalize(raw: Option<&str>) -> Self {
        match raw.map(|raw| raw.trim().to_ascii_lowercase()).as_deref() {
            Some("low") => Self::Low,
            Some("high") => Self::High,
            Some("critical") => Self::Critical,
            _ => Self::Medium,
        }
    }

    pub fn weight(self) -> u32 {
        match self {
            Self::Low => 5,
            Self::Medium => 10,
            Self::High => 20,
            Self::Critical => 30,
        }
    }

    pub fn is_red_flag(self) -> bool {
        self >= Self::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub category: String,
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDigest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Whether any accepted output carried issue records at all.
    pub classified: bool,
    pub issues: Vec<Issue>,
    pub risks: Vec<String>,
    pub assumptions: Vec<String>,
    pub suggestions: Vec<String>,
    pub checklist: Vec<String>,
    pub risk_score: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refactored_code: Option<String>,
}

impl ReviewDigest {
    pub fn from_result(result: &RunResult) -> Self {
        let mut digest = Self::default();
        let mut analysis_summary = None;

        for outcome in &result.steps {
            let Some(output) = result.accepted.get(&outcome.step) else {
                continue;
            };
            for (field, value) in output.fields() {
                match (field.as_str(), value) {
                    (TEXT_FIELD, FieldValue::Text(text)) => {
                        digest.summary.get_or_insert_with(|| text.clone());
                    }
                    (SUMMARY_FIELD, FieldValue::Text(text)) => {
                        analysis_summary.get_or_insert_with(|| text.clone());
                    }
                    (CODE_FIELD, FieldValue::Text(code)) => {
                        digest.refactored_code = Some(code.clone());
                    }
                    (RISKS_FIELD, FieldValue::List(items)) => {
                        extend_unique(&mut digest.risks, items);
                    }
                    (ASSUMPTIONS_FIELD, FieldValue::List(items)) => {
                        extend_unique(&mut digest.assumptions, items);
                    }
                    (SUGGESTIONS_FIELD, FieldValue::List(items)) => {
                        extend_unique(&mut digest.suggestions, items);
                    }
                    (_, FieldValue::Records(records)) => {
                        digest.classified = true;
                        digest.issues.extend(records.iter().map(|record| Issue {
                            category: record
                                .get("category")
                                .map(|category| category.trim().to_ascii_lowercase())
                                .unwrap_or_else(|| field.clone()),
                            severity: Severity::normalize(record.get("severity").map(String::as_str)),
                            message: record
                                .get("message")
                                .cloned()
                                .unwrap_or_else(|| joined_values(record)),
                        }));
                    }
                    _ => {}
                }
            }
        }

        if digest.summary.is_none() {
            digest.summary = analysis_summary;
        }
        digest.checklist = checklist(&digest);
        digest.risk_score = risk_score(&digest);
        digest
    }

    pub fn issues_in<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Issue> + 'a {
        self.issues
            .iter()
            .filter(move |issue| issue.category == category)
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !target.iter().any(|existing| existing == item) {
            target.push(item.to_string());
        }
    }
}

fn joined_values(record: &std::collections::BTreeMap<String, String>) -> String {
    record
        .values()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join("; ")
}

fn risk_score(digest: &ReviewDigest) -> u32 {
    let issues: u32 = digest.issues.iter().map(|issue| issue.severity.weight()).sum();
    let risks = RISK_WEIGHT.saturating_mul(digest.risks.len() as u32);
    issues.saturating_add(risks).min(MAX_RISK_SCORE)
}

fn checklist(digest: &ReviewDigest) -> Vec<String> {
    let mut items = Vec::new();
    let review = digest
        .risks
        .iter()
        .chain(&digest.assumptions)
        .map(|text| format!("Review: {text}"));
    let clarify = digest
        .issues_in(UNCERTAINTY_CATEGORY)
        .map(|issue| issue.message.trim())
        .filter(|text| !text.is_empty())
        .map(|text| format!("Clarify: {text}"));
    for item in review.chain(clarify) {
        if !items.contains(&item) {
            items.push(item);
        }
    }
    items
}
