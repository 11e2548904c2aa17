//! Schema-conformant results of accepted attempts.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One field of a structured output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
    Records(Vec<BTreeMap<String, String>>),
}

impl FieldValue {
    /// Every free-text string carried by the value, in order.
    pub fn strings(&self) -> Vec<&str> {
        match self {
            Self::Text(text) => vec![text.as_str()],
            Self::List(items) => items.iter().map(String::as_str).collect(),
            Self::Records(records) => records
                .iter()
                .flat_map(|record| record.values().map(String::as_str))
                .collect(),
        }
    }
}

/// Parsed output of one accepted attempt, keyed by schema field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StructuredOutput {
    fields: BTreeMap<String, FieldValue>,
}

impl StructuredOutput {
    pub fn new(fields: BTreeMap<String, FieldValue>) -> Self {
        Self { fields }
    }

    pub fn single(name: &str, text: String) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(name.to_string(), FieldValue::Text(text));
        Self { fields }
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.fields.get(name) {
            Some(FieldValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn list(&self, name: &str) -> Option<&[String]> {
        match self.fields.get(name) {
            Some(FieldValue::List(items)) => Some(items),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn records(&self, name: &str) -> Option<&[BTreeMap<String, String>]> {
        match self.fields.get(name) {
            Some(FieldValue::Records(records)) => Some(records),
            _ => None,
        }
    }
}
