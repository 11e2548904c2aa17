//! Exact-shape conformance of parsed JSON against a field list.
use super::syntax::json_type;
use super::{Rejection, RejectionKind};
use crate::catalog::{FieldKind, FieldSpec};
use crate::output::{FieldValue, StructuredOutput};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};

pub(super) fn conform(
    fields: &[FieldSpec],
    object: &Map<String, Value>,
) -> Result<StructuredOutput, Rejection> {
    let expected: BTreeSet<&str> = fields.iter().map(|f| f.name.as_str()).collect();
    let actual: BTreeSet<&str> = object.keys().map(String::as_str).collect();
    check_key_set("response", &expected, &actual)?;

    let mut values = BTreeMap::new();
    for field in fields {
        let Some(value) = object.get(&field.name) else {
            continue;
        };
        let converted = convert(&field.name, &field.kind, value)?;
        values.insert(field.name.clone(), converted);
    }
    Ok(StructuredOutput::new(values))
}

fn check_key_set(
    location: &str,
    expected: &BTreeSet<&str>,
    actual: &BTreeSet<&str>,
) -> Result<(), Rejection> {
    let missing: Vec<&str> = expected.difference(actual).copied().collect();
    let extra: Vec<&str> = actual.difference(expected).copied().collect();
    if missing.is_empty() && extra.is_empty() {
        return Ok(());
    }
    let mut problems = Vec::new();
    if !missing.is_empty() {
        problems.push(format!("missing {}", missing.join(", ")));
    }
    if !extra.is_empty() {
        problems.push(format!("unexpected {}", extra.join(", ")));
    }
    Err(Rejection::new(
        RejectionKind::Schema,
        format!("{location} fields differ: {}", problems.join("; ")),
    ))
}

fn convert(name: &str, kind: &FieldKind, value: &Value) -> Result<FieldValue, Rejection> {
    match kind {
        FieldKind::Text | FieldKind::Enum { .. } => match value {
            Value::String(text) => Ok(FieldValue::Text(text.clone())),
            other => Err(type_error(name, "a string", other)),
        },
        FieldKind::TextList | FieldKind::EnumList { .. } => {
            let Value::Array(items) = value else {
                return Err(type_error(name, "an array of strings", value));
            };
            let mut strings = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                match item {
                    Value::String(text) => strings.push(text.clone()),
                    other => return Err(type_error(&format!("{name}[{idx}]"), "a string", other)),
                }
            }
            Ok(FieldValue::List(strings))
        }
        FieldKind::Records { fields } => {
            let Value::Array(items) = value else {
                return Err(type_error(name, "an array of objects", value));
            };
            let expected: BTreeSet<&str> = fields.iter().map(|f| f.name.as_str()).collect();
            let mut records = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let location = format!("{name}[{idx}]");
                let Value::Object(record) = item else {
                    return Err(type_error(&location, "an object", item));
                };
                let actual: BTreeSet<&str> = record.keys().map(String::as_str).collect();
                check_key_set(&location, &expected, &actual)?;
                let mut converted = BTreeMap::new();
                for (key, value) in record {
                    let Value::String(text) = value else {
                        return Err(type_error(&format!("{location}.{key}"), "a string", value));
                    };
                    converted.insert(key.clone(), text.clone());
                }
                records.push(converted);
            }
            Ok(FieldValue::Records(records))
        }
    }
}

fn type_error(location: &str, expected: &str, actual: &Value) -> Rejection {
    Rejection::new(
        RejectionKind::Schema,
        format!("`{location}` must be {expected}, got {}", json_type(actual)),
    )
}

/// (field, text) pairs that the grounding check must cover.
pub(super) fn grounded_strings<'a>(
    fields: &'a [FieldSpec],
    output: &'a StructuredOutput,
) -> Vec<(&'a str, &'a str)> {
    let mut strings = Vec::new();
    for field in fields {
        let Some(value) = output.get(&field.name) else {
            continue;
        };
        match (&field.kind, value) {
            (FieldKind::Text, FieldValue::Text(text)) if field.grounded => {
                strings.push((field.name.as_str(), text.as_str()));
            }
            (FieldKind::TextList, FieldValue::List(items)) if field.grounded => {
                strings.extend(items.iter().map(|item| (field.name.as_str(), item.as_str())));
            }
            (FieldKind::Records { fields: subs }, FieldValue::Records(records)) => {
                for sub in subs.iter().filter(|sub| sub.grounded && sub.values.is_none()) {
                    for record in records {
                        if let Some(text) = record.get(&sub.name) {
                            strings.push((sub.name.as_str(), text.as_str()));
                        }
                    }
                }
            }
            _ => {}
        }
    }
    strings
}
