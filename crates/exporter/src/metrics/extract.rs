use thiserror::Error;

use crate::parser::{KnownField, LogFields};

/// nginx writes `-` for variables that have no value.
pub const ABSENT: &str = "-";

#[derive(Debug, Error, PartialEq)]
#[error("value '{value}' could not be parsed into float")]
pub struct ExtractError {
    pub value: String,
}

/// Read a single float. Missing fields and `-` yield `Ok(None)`.
pub fn float_field(fields: &LogFields, field: KnownField) -> Result<Option<f64>, ExtractError> {
    match fields.known(field) {
        None => Ok(None),
        Some(value) => parse_single(value),
    }
}

/// Read a byte count. Counters only move forward, so negative and
/// non-finite values are rejected like unparsable ones.
pub fn byte_field(fields: &LogFields, field: KnownField) -> Result<Option<f64>, ExtractError> {
    match float_field(fields, field)? {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ExtractError {
            value: fields.known(field).unwrap_or_default().to_string(),
        }),
        other => Ok(other),
    }
}

/// Read a field that may list one value per upstream hop, separated by
/// `,` or `:`, and return their sum. `-` entries are skipped; any other
/// unparsable entry, blank ones included, fails the whole field.
pub fn float_field_multi(
    fields: &LogFields,
    field: KnownField,
) -> Result<Option<f64>, ExtractError> {
    let Some(value) = fields.known(field) else {
        return Ok(None);
    };
    if let Ok(single) = parse_single(value) {
        return Ok(single);
    }

    let mut sum = 0.0;
    for token in value.split([',', ':']).map(str::trim) {
        if token == ABSENT {
            continue;
        }
        sum += token.parse::<f64>().map_err(|_| ExtractError {
            value: value.to_string(),
        })?;
    }
    Ok(Some(sum))
}

fn parse_single(value: &str) -> Result<Option<f64>, ExtractError> {
    if value == ABSENT {
        return Ok(None);
    }
    value.parse::<f64>().map(Some).map_err(|_| ExtractError {
        value: value.to_string(),
    })
}
