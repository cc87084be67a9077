use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Separator the store uses for multi-select values.
pub const MULTI_SELECT_DELIMITER: &str = ";";

/// Candidate record: field name to generated value.
pub type Record = BTreeMap<String, RecordValue>;

/// A single field value in the store's scalar model.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    Null,
    Bool(bool),
    Int(i64),
    Decimal(f64),
    Text(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    MultiSelect(Vec<String>),
}

impl RecordValue {
    pub fn is_null(&self) -> bool {
        matches!(self, RecordValue::Null)
    }

    /// Blank in the store's sense: null, whitespace-only text or no selections.
    pub fn is_blank(&self) -> bool {
        match self {
            RecordValue::Null => true,
            RecordValue::Text(value) => value.trim().is_empty(),
            RecordValue::MultiSelect(values) => values.is_empty(),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RecordValue::Int(value) => Some(*value as f64),
            RecordValue::Decimal(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            RecordValue::Date(value) => Some(*value),
            RecordValue::DateTime(value) => Some(value.date()),
            _ => None,
        }
    }

    /// Native encoding used in CSV cells and cache fingerprints.
    pub fn to_field_string(&self) -> String {
        match self {
            RecordValue::Null => String::new(),
            RecordValue::Bool(value) => value.to_string(),
            RecordValue::Int(value) => value.to_string(),
            RecordValue::Decimal(value) => value.to_string(),
            RecordValue::Text(value) => value.clone(),
            RecordValue::Date(value) => value.format("%Y-%m-%d").to_string(),
            RecordValue::DateTime(value) => value.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            RecordValue::MultiSelect(values) => values.join(MULTI_SELECT_DELIMITER),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            RecordValue::Null => Value::Null,
            RecordValue::Bool(value) => Value::Bool(*value),
            RecordValue::Int(value) => Value::from(*value),
            RecordValue::Decimal(value) => serde_json::Number::from_f64(*value)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            other => Value::String(other.to_field_string()),
        }
    }

    /// Loose conversion from JSON; strings stay text and are typed later
    /// against the field's declared type.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => RecordValue::Null,
            Value::Bool(value) => RecordValue::Bool(*value),
            Value::Number(number) => match number.as_i64() {
                Some(value) => RecordValue::Int(value),
                None => number
                    .as_f64()
                    .map(RecordValue::Decimal)
                    .unwrap_or(RecordValue::Null),
            },
            Value::String(value) => RecordValue::Text(value.clone()),
            Value::Array(items) => RecordValue::MultiSelect(
                items
                    .iter()
                    .map(|item| match item {
                        Value::String(value) => value.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Value::Object(_) => RecordValue::Text(value.to_string()),
        }
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Null => f.write_str("null"),
            other => f.write_str(&other.to_field_string()),
        }
    }
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RecordValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(RecordValue::from_json(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_native_scalar_encodings() {
        let mut record = Record::new();
        record.insert(
            "CloseDate".to_string(),
            RecordValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()),
        );
        record.insert(
            "Interests".to_string(),
            RecordValue::MultiSelect(vec!["Golf".to_string(), "Sailing".to_string()]),
        );
        record.insert("Amount".to_string(), RecordValue::Decimal(12.5));
        record.insert("Industry".to_string(), RecordValue::Null);

        let json = serde_json::to_string(&record).expect("serialize record");
        assert_eq!(
            json,
            r#"{"Amount":12.5,"CloseDate":"2024-03-09","Industry":null,"Interests":"Golf;Sailing"}"#
        );
    }

    #[test]
    fn blank_covers_whitespace_and_empty_selection() {
        assert!(RecordValue::Null.is_blank());
        assert!(RecordValue::Text("  ".to_string()).is_blank());
        assert!(RecordValue::MultiSelect(Vec::new()).is_blank());
        assert!(!RecordValue::Bool(false).is_blank());
        assert!(!RecordValue::Int(0).is_blank());
    }
}
