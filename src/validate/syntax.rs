use super::{Rejection, RejectionKind};
use serde_json::{Map, Value};

/// Strip a surrounding Markdown code fence, if any, and trim.
///
/// A ```json fence wins over a plain one; a plain fence may carry a
/// language tag on its opening line.
pub fn strip_fences(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        let start = text[start..]
            .find('\n')
            .map(|i| start + i + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}

pub(super) fn parse_object(raw: &str) -> Result<Map<String, Value>, Rejection> {
    let body = strip_fences(raw);
    let value: Value = serde_json::from_str(body).map_err(|err| {
        Rejection::new(
            RejectionKind::Syntax,
            format!("response is not valid JSON: {err}"),
        )
    })?;
    match value {
        Value::Object(object) => Ok(object),
        other => Err(Rejection::new(
            RejectionKind::Syntax,
            format!("expected a JSON object, got {}", json_type(&other)),
        )),
    }
}

pub(super) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
