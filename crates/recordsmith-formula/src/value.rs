use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use recordsmith_core::{FieldType, MULTI_SELECT_DELIMITER, RecordValue};

/// Value produced while evaluating a formula.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl FormulaValue {
    /// Null and empty text are both blank.
    pub fn is_blank(&self) -> bool {
        match self {
            FormulaValue::Null => true,
            FormulaValue::Text(value) => value.trim().is_empty(),
            _ => false,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            FormulaValue::Null => "null",
            FormulaValue::Bool(_) => "boolean",
            FormulaValue::Number(_) => "number",
            FormulaValue::Text(_) => "text",
            FormulaValue::Date(_) => "date",
            FormulaValue::DateTime(_) => "datetime",
        }
    }

    /// Text rendering used by `&`, `TEXT()` and string functions.
    pub fn to_text(&self) -> String {
        match self {
            FormulaValue::Null => String::new(),
            FormulaValue::Bool(value) => value.to_string(),
            FormulaValue::Number(value) => format_number(*value),
            FormulaValue::Text(value) => value.clone(),
            FormulaValue::Date(value) => value.format("%Y-%m-%d").to_string(),
            FormulaValue::DateTime(value) => value.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FormulaValue::Number(value) => Some(*value),
            FormulaValue::Text(value) => value.trim().parse::<f64>().ok(),
            _ => None,
        }
    }

    /// Convert a record value using the field's declared type.
    ///
    /// Text payloads are coerced the way the store would hand them to a
    /// formula: booleans from `true`/`false`, numbers from numeric text,
    /// dates and datetimes from ISO text. Undeclared fields keep the shape of
    /// the stored value.
    pub fn from_record_value(value: &RecordValue, declared: Option<FieldType>) -> Self {
        match value {
            RecordValue::Null => FormulaValue::Null,
            RecordValue::Bool(value) => FormulaValue::Bool(*value),
            RecordValue::Int(value) => FormulaValue::Number(*value as f64),
            RecordValue::Decimal(value) => FormulaValue::Number(*value),
            RecordValue::Date(value) => FormulaValue::Date(*value),
            RecordValue::DateTime(value) => FormulaValue::DateTime(*value),
            RecordValue::MultiSelect(values) => {
                FormulaValue::Text(values.join(MULTI_SELECT_DELIMITER))
            }
            RecordValue::Text(text) => coerce_text(text, declared),
        }
    }
}

fn coerce_text(text: &str, declared: Option<FieldType>) -> FormulaValue {
    let trimmed = text.trim();
    let coerced = match declared {
        Some(FieldType::Boolean) => match trimmed.to_ascii_lowercase().as_str() {
            "true" => Some(FormulaValue::Bool(true)),
            "false" => Some(FormulaValue::Bool(false)),
            _ => None,
        },
        Some(field_type) if field_type.is_numeric() => {
            trimmed.parse::<f64>().ok().map(FormulaValue::Number)
        }
        Some(FieldType::Date) => parse_date(trimmed).map(FormulaValue::Date),
        Some(FieldType::Datetime) => parse_datetime(trimmed).map(FormulaValue::DateTime),
        _ => None,
    };
    coerced.unwrap_or_else(|| FormulaValue::Text(text.to_string()))
}

/// Parse `YYYY-MM-DD`, also accepting the date part of an ISO datetime.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_datetime(text).map(|value| value.date()))
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Whether an error-condition formula fired.
pub fn is_truthy(value: &FormulaValue) -> bool {
    match value {
        FormulaValue::Bool(value) => *value,
        FormulaValue::Number(value) => *value != 0.0,
        FormulaValue::Text(value) => value.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

impl fmt::Display for FormulaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaValue::Null => f.write_str("NULL"),
            FormulaValue::Text(value) => write!(f, "\"{value}\""),
            other => f.write_str(&other.to_text()),
        }
    }
}
