use std::collections::HashMap;

use chrono::NaiveDate;
use recordsmith_core::{
    FieldDescriptor, FieldType, MULTI_SELECT_DELIMITER, ObjectSchema, RecordValue,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::GenerationError;
use crate::model::FieldSuggestions;

/// A suggested value that was dropped before generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedSuggestion {
    pub field: String,
    pub value: String,
    pub reason: String,
}

/// Validated suggestion pool keyed by the declared field name.
#[derive(Debug, Clone, Default)]
pub struct SuggestionPool {
    candidates: HashMap<String, Vec<RecordValue>>,
}

impl SuggestionPool {
    /// Type-check every candidate against `object`; invalid ones are
    /// returned instead of kept.
    pub fn build(
        object: &ObjectSchema,
        suggestions: &FieldSuggestions,
    ) -> (Self, Vec<RejectedSuggestion>) {
        let mut pool = Self::default();
        let mut rejected = Vec::new();
        for (field_name, values) in suggestions {
            let reject = |value: &str, reason: &str| RejectedSuggestion {
                field: field_name.clone(),
                value: value.to_string(),
                reason: reason.to_string(),
            };
            let Some(field) = object.field(field_name) else {
                rejected.extend(values.iter().map(|value| reject(value, "unknown field")));
                continue;
            };
            if !field.is_generatable() {
                rejected.extend(values.iter().map(|value| reject(value, "field is not createable")));
                continue;
            }
            for value in values {
                match typed_candidate(field, value) {
                    Ok(candidate) => pool
                        .candidates
                        .entry(field.name.clone())
                        .or_default()
                        .push(candidate),
                    Err(reason) => rejected.push(reject(value, &reason)),
                }
            }
        }
        debug!(
            object = %object.name,
            fields = pool.candidates.len(),
            rejected = rejected.len(),
            "suggestion pool built"
        );
        (pool, rejected)
    }

    pub fn candidates(&self, field: &str) -> &[RecordValue] {
        self.candidates
            .get(field)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

fn typed_candidate(field: &FieldDescriptor, raw: &str) -> Result<RecordValue, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("blank value".to_string());
    }
    match field.field_type {
        FieldType::Text | FieldType::LongText | FieldType::Phone | FieldType::Url => {
            check_length(field.max_length, value)?;
            Ok(RecordValue::Text(value.to_string()))
        }
        FieldType::Email => {
            check_length(field.max_length, value)?;
            if !value.contains('@') {
                return Err("not an email address".to_string());
            }
            Ok(RecordValue::Text(value.to_string()))
        }
        FieldType::Integer => value
            .parse::<i64>()
            .map(RecordValue::Int)
            .map_err(|_| "not an integer".to_string()),
        FieldType::Decimal | FieldType::Currency | FieldType::Percent => value
            .parse::<f64>()
            .ok()
            .filter(|number| number.is_finite())
            .map(RecordValue::Decimal)
            .ok_or_else(|| "not a number".to_string()),
        FieldType::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(RecordValue::Date)
            .map_err(|_| "not an ISO date".to_string()),
        FieldType::Datetime => chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ")
            .or_else(|_| chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
            .map(RecordValue::DateTime)
            .map_err(|_| "not an ISO datetime".to_string()),
        FieldType::Boolean => match value.to_ascii_lowercase().as_str() {
            "true" => Ok(RecordValue::Bool(true)),
            "false" => Ok(RecordValue::Bool(false)),
            _ => Err("not a boolean".to_string()),
        },
        FieldType::SingleSelect => {
            if field.has_option(value) {
                Ok(RecordValue::Text(value.to_string()))
            } else {
                Err("not an active picklist value".to_string())
            }
        }
        FieldType::MultiSelect => {
            let selected: Vec<String> = value
                .split(MULTI_SELECT_DELIMITER)
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect();
            if selected.iter().all(|item| field.has_option(item)) {
                Ok(RecordValue::MultiSelect(selected))
            } else {
                Err("not an active picklist value".to_string())
            }
        }
        FieldType::Reference | FieldType::Identifier => {
            if value.len() == 15 || value.len() == 18 {
                Ok(RecordValue::Text(value.to_string()))
            } else {
                Err("not a record id".to_string())
            }
        }
    }
}

fn check_length(max_length: Option<u32>, value: &str) -> Result<(), String> {
    match max_length {
        Some(max) if value.chars().count() > max as usize => {
            Err(format!("longer than max length {max}"))
        }
        _ => Ok(()),
    }
}

/// Parse a suggestions document (`{ "Field": ["value", ...] }`). Scalar
/// numbers and booleans are accepted and kept in their text form.
pub fn parse_suggestions(contents: &str) -> Result<FieldSuggestions, GenerationError> {
    let value: Value = serde_json::from_str(contents)?;
    let Value::Object(entries) = value else {
        return Err(GenerationError::InvalidSuggestions(
            "expected an object of field name to value list".to_string(),
        ));
    };
    let mut suggestions = FieldSuggestions::new();
    for (field, values) in entries {
        let Value::Array(items) = values else {
            return Err(GenerationError::InvalidSuggestions(format!(
                "field {field}: expected a list of values"
            )));
        };
        let mut parsed = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Value::String(text) => parsed.push(text),
                Value::Number(number) => parsed.push(number.to_string()),
                Value::Bool(flag) => parsed.push(flag.to_string()),
                other => {
                    return Err(GenerationError::InvalidSuggestions(format!(
                        "field {field}: unsupported value {other}"
                    )));
                }
            }
        }
        suggestions.insert(field, parsed);
    }
    Ok(suggestions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object() -> ObjectSchema {
        ObjectSchema {
            name: "Account".to_string(),
            label: None,
            fields: vec![
                FieldDescriptor::new("Name", FieldType::Text).with_max_length(10),
                FieldDescriptor::new("Industry", FieldType::SingleSelect)
                    .with_options(["Banking", "Retail"]),
                FieldDescriptor::new("NumberOfEmployees", FieldType::Integer),
            ],
            validation_rules: Vec::new(),
        }
    }

    #[test]
    fn drops_invalid_candidates() {
        let suggestions = parse_suggestions(
            r#"{
                "Name": ["Acme", "A very long company name"],
                "Industry": ["Banking", "Mining"],
                "NumberOfEmployees": [12, "many"],
                "Missing": ["x"]
            }"#,
        )
        .expect("parse suggestions");
        let (pool, rejected) = SuggestionPool::build(&object(), &suggestions);

        assert_eq!(pool.candidates("Name"), [RecordValue::Text("Acme".to_string())]);
        assert_eq!(pool.candidates("Industry"), [RecordValue::Text("Banking".to_string())]);
        assert_eq!(pool.candidates("NumberOfEmployees"), [RecordValue::Int(12)]);

        let reasons: Vec<(&str, &str)> = rejected
            .iter()
            .map(|item| (item.field.as_str(), item.reason.as_str()))
            .collect();
        assert!(reasons.contains(&("Industry", "not an active picklist value")));
        assert!(reasons.contains(&("NumberOfEmployees", "not an integer")));
        assert!(reasons.contains(&("Missing", "unknown field")));
        assert!(reasons.contains(&("Name", "longer than max length 10")));
    }

    #[test]
    fn rejects_non_object_documents() {
        let err = parse_suggestions(r#"["Acme"]"#).expect_err("array is invalid");
        assert!(matches!(err, GenerationError::InvalidSuggestions(_)));
    }
}
