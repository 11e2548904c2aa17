//! Enumerated-value and forbidden-token checks.
use super::{Rejection, RejectionKind};
use crate::catalog::{FieldKind, OutputSchema};
use crate::output::{FieldValue, StructuredOutput};

pub(super) fn check(
    schema: &OutputSchema,
    output: &StructuredOutput,
    marker: &str,
) -> Result<(), Rejection> {
    if let OutputSchema::Json { fields, .. } = schema {
        for field in fields {
            let Some(value) = output.get(&field.name) else {
                continue;
            };
            match (&field.kind, value) {
                (FieldKind::Enum { values }, FieldValue::Text(text)) => {
                    check_value(&field.name, text, values, marker)?;
                }
                (FieldKind::EnumList { values }, FieldValue::List(items)) => {
                    for item in items {
                        check_value(&field.name, item, values, marker)?;
                    }
                }
                (FieldKind::Records { fields: subs }, FieldValue::Records(records)) => {
                    for record in records {
                        for sub in subs {
                            let (Some(values), Some(text)) = (&sub.values, record.get(&sub.name))
                            else {
                                continue;
                            };
                            let location = format!("{}.{}", field.name, sub.name);
                            check_value(&location, text, values, marker)?;
                        }
                    }
                }
                _ => {}
            }
        }
    }
    check_forbidden(schema.forbidden(), output)
}

fn check_value(field: &str, value: &str, allowed: &[String], marker: &str) -> Result<(), Rejection> {
    if value == marker || allowed.iter().any(|v| v == value) {
        return Ok(());
    }
    Err(Rejection::new(
        RejectionKind::Vocabulary,
        format!(
            "`{field}` value `{value}` is not one of: {}, {marker}",
            allowed.join(", ")
        ),
    ))
}

fn check_forbidden(forbidden: &[String], output: &StructuredOutput) -> Result<(), Rejection> {
    if forbidden.is_empty() {
        return Ok(());
    }
    for (name, value) in output.fields() {
        for text in value.strings() {
            let lowered = text.to_lowercase();
            if let Some(token) = forbidden
                .iter()
                .find(|token| lowered.contains(&token.to_lowercase()))
            {
                return Err(Rejection::new(
                    RejectionKind::Vocabulary,
                    format!("field `{name}` contains forbidden token `{token}`"),
                ));
            }
        }
    }
    Ok(())
}
