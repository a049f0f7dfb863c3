use serde_json::{Map, Value};

use crate::parser::traits::{LogFields, LogParser, ParseError};

/// Parser for access logs written with `log_format ... escape=json`.
///
/// Each line must be a single JSON object. Top-level keys become field
/// names; scalars are stringified and nested values are kept as their
/// serialized JSON text.
#[derive(Debug, Default)]
pub struct JsonParser;

impl JsonParser {
    pub fn new() -> Self {
        Self
    }
}

impl LogParser for JsonParser {
    fn parse(&self, line: &str) -> Result<LogFields, ParseError> {
        let value: Value =
            serde_json::from_str(line).map_err(|e| ParseError::InvalidJson(e.to_string()))?;

        let obj = value.as_object().ok_or(ParseError::NotAnObject)?;
        Ok(extract_fields(obj))
    }
}

fn extract_fields(obj: &Map<String, Value>) -> LogFields {
    let mut fields = LogFields::new();
    for (key, value) in obj {
        if let Some(text) = value_to_string(value) {
            fields.insert(key, text);
        }
    }
    fields
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        // Preserve nested structures as serialized JSON
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).ok(),
    }
}
