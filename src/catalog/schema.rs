//! Closed output schemas attached to each step.
//!
//! A schema is the full contract a step's output must satisfy: its format,
//! its exact field set, enumerated vocabularies, which free-text fields must
//! be grounded in the artifact, and tokens that must never appear.
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};

/// Field name under which a `text` schema stores its output.
pub const TEXT_FIELD: &str = "text";
/// Field name under which a `code` schema stores its output.
pub const CODE_FIELD: &str = "code";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum OutputSchema {
    /// Free prose, stored under [`TEXT_FIELD`].
    Text {
        #[serde(default)]
        grounded: bool,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        forbidden: Vec<String>,
    },
    /// A JSON object whose keys are exactly `fields`.
    Json {
        fields: Vec<FieldSpec>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        forbidden: Vec<String>,
    },
    /// Source code, stored under [`CODE_FIELD`].
    Code {
        #[serde(default)]
        preserve_behavior: bool,
        #[serde(default = "default_allowed_edits")]
        allowed_edits: Vec<EditClass>,
    },
}

/// Edits a behavior-preserving step may make without tripping the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditClass {
    Whitespace,
    Comments,
    /// Unquoted words compare case-insensitively.
    KeywordCase,
}

fn default_allowed_edits() -> Vec<EditClass> {
    vec![EditClass::Whitespace, EditClass::Comments]
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
    /// Identifier-like tokens in this field must appear in the artifact.
    #[serde(default)]
    pub grounded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextList,
    Enum { values: Vec<String> },
    EnumList { values: Vec<String> },
    Records { fields: Vec<RecordField> },
}

/// Sub-field of a record. Free text when `values` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordField {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
    #[serde(default)]
    pub grounded: bool,
}

impl OutputSchema {
    pub fn format_name(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Json { .. } => "json",
            Self::Code { .. } => "code",
        }
    }

    /// Names of the fields an accepted output carries, sorted.
    pub fn field_names(&self) -> BTreeSet<&str> {
        match self {
            Self::Text { .. } => BTreeSet::from([TEXT_FIELD]),
            Self::Code { .. } => BTreeSet::from([CODE_FIELD]),
            Self::Json { fields, .. } => fields.iter().map(|f| f.name.as_str()).collect(),
        }
    }

    pub fn forbidden(&self) -> &[String] {
        match self {
            Self::Text { forbidden, .. } | Self::Json { forbidden, .. } => forbidden,
            Self::Code { .. } => &[],
        }
    }

    /// Every enumerated value declared anywhere in the schema.
    pub fn enum_values(&self) -> BTreeSet<&str> {
        let mut values = BTreeSet::new();
        if let Self::Json { fields, .. } = self {
            for field in fields {
                match &field.kind {
                    FieldKind::Enum { values: v } | FieldKind::EnumList { values: v } => {
                        values.extend(v.iter().map(String::as_str));
                    }
                    FieldKind::Records { fields } => {
                        for sub in fields {
                            if let Some(v) = &sub.values {
                                values.extend(v.iter().map(String::as_str));
                            }
                        }
                    }
                    FieldKind::Text | FieldKind::TextList => {}
                }
            }
        }
        values
    }

    /// Skeleton of the expected output, embedded in prompts as `{schema}`.
    pub fn template_hint(&self, uncertainty_marker: &str) -> String {
        match self {
            Self::Text { .. } => format!(
                "Plain prose only. Write {uncertainty_marker} for anything the code does not show."
            ),
            Self::Code { .. } => "The complete code only, no explanation.".to_string(),
            Self::Json { fields, .. } => {
                let mut object = serde_json::Map::new();
                for field in fields {
                    object.insert(field.name.clone(), field.kind.hint());
                }
                serde_json::to_string_pretty(&Value::Object(object))
                    .unwrap_or_else(|_| "{}".to_string())
            }
        }
    }

    /// Check that `self`, used as a fallback, produces output the original's
    /// consumers can still read, under guards at least as strict.
    pub fn compatible_as_fallback_for(&self, original: &OutputSchema) -> Result<(), String> {
        match (self, original) {
            (
                Self::Text { grounded, .. },
                Self::Text {
                    grounded: orig_grounded,
                    ..
                },
            ) => {
                if *orig_grounded && !grounded {
                    return Err("output must stay grounded".to_string());
                }
                self.keeps_forbidden(original)
            }
            (
                Self::Code {
                    preserve_behavior,
                    allowed_edits,
                },
                Self::Code {
                    preserve_behavior: orig_preserve,
                    allowed_edits: orig_edits,
                },
            ) => {
                if !orig_preserve {
                    return Ok(());
                }
                if !preserve_behavior {
                    return Err("output must preserve behavior".to_string());
                }
                match allowed_edits.iter().find(|edit| !orig_edits.contains(edit)) {
                    Some(edit) => Err(format!(
                        "edit class `{}` is not allowed by the original",
                        edit.name()
                    )),
                    None => Ok(()),
                }
            }
            (Self::Json { fields, .. }, Self::Json { fields: orig, .. }) => {
                let by_name: BTreeMap<&str, &FieldSpec> =
                    orig.iter().map(|f| (f.name.as_str(), f)).collect();
                for field in fields {
                    let Some(orig_field) = by_name.get(field.name.as_str()) else {
                        return Err(format!(
                            "field `{}` is not part of the original schema",
                            field.name
                        ));
                    };
                    if orig_field.grounded && !field.grounded {
                        return Err(format!("field `{}` must stay grounded", field.name));
                    }
                    field
                        .kind
                        .compatible_with(&orig_field.kind)
                        .map_err(|reason| format!("field `{}`: {reason}", field.name))?;
                }
                self.keeps_forbidden(original)
            }
            (fallback, original) => Err(format!(
                "format `{}` cannot stand in for `{}`",
                fallback.format_name(),
                original.format_name()
            )),
        }
    }

    fn keeps_forbidden(&self, original: &OutputSchema) -> Result<(), String> {
        let forbidden = self.forbidden();
        match original
            .forbidden()
            .iter()
            .find(|token| !forbidden.contains(token))
        {
            Some(token) => Err(format!("forbidden token `{token}` is dropped")),
            None => Ok(()),
        }
    }
}

impl EditClass {
    pub fn name(self) -> &'static str {
        match self {
            Self::Whitespace => "whitespace",
            Self::Comments => "comments",
            Self::KeywordCase => "keyword_case",
        }
    }
}

impl FieldKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::TextList => "text_list",
            Self::Enum { .. } => "enum",
            Self::EnumList { .. } => "enum_list",
            Self::Records { .. } => "records",
        }
    }

    fn hint(&self) -> Value {
        match self {
            Self::Text => json!("string"),
            Self::TextList => json!(["string"]),
            Self::Enum { values } => json!(values.join(" | ")),
            Self::EnumList { values } => json!([values.join(" | ")]),
            Self::Records { fields } => {
                let mut record = serde_json::Map::new();
                for sub in fields {
                    let hint = match &sub.values {
                        Some(values) => values.join(" | "),
                        None => "string".to_string(),
                    };
                    record.insert(sub.name.clone(), Value::String(hint));
                }
                Value::Array(vec![Value::Object(record)])
            }
        }
    }

    fn compatible_with(&self, original: &FieldKind) -> Result<(), String> {
        match (self, original) {
            (Self::Text, Self::Text) | (Self::TextList, Self::TextList) => Ok(()),
            (Self::Enum { values }, Self::Enum { values: orig })
            | (Self::EnumList { values }, Self::EnumList { values: orig }) => {
                subset(values, orig).map_err(|value| format!("value `{value}` is not in the original vocabulary"))
            }
            (Self::Records { fields }, Self::Records { fields: orig }) => {
                for sub in fields {
                    let Some(orig_sub) = orig.iter().find(|o| o.name == sub.name) else {
                        return Err(format!("record field `{}` is not in the original", sub.name));
                    };
                    if orig_sub.grounded && !sub.grounded {
                        return Err(format!("record field `{}` must stay grounded", sub.name));
                    }
                    match (&sub.values, &orig_sub.values) {
                        (None, None) => {}
                        (Some(values), Some(orig_values)) => {
                            subset(values, orig_values).map_err(|value| {
                                format!(
                                    "record field `{}` value `{value}` is not in the original vocabulary",
                                    sub.name
                                )
                            })?;
                        }
                        _ => {
                            return Err(format!(
                                "record field `{}` changes between free text and enumerated",
                                sub.name
                            ))
                        }
                    }
                }
                Ok(())
            }
            (fallback, original) => Err(format!(
                "type `{}` cannot stand in for `{}`",
                fallback.type_name(),
                original.type_name()
            )),
        }
    }
}

fn subset<'a>(values: &'a [String], allowed: &[String]) -> Result<(), &'a str> {
    match values.iter().find(|value| !allowed.contains(value)) {
        Some(value) => Err(value),
        None => Ok(()),
    }
}
