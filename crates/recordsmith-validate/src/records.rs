use std::fs;
use std::path::Path;

use recordsmith_core::Record;
use serde_json::Value;

use crate::errors::ValidateError;

/// Parse a JSON array of record objects.
pub fn parse_records(contents: &str) -> Result<Vec<Record>, ValidateError> {
    let value: Value = serde_json::from_str(contents)?;
    let Value::Array(items) = value else {
        return Err(ValidateError::InvalidRecords(
            "expected a JSON array of records".to_string(),
        ));
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            if !item.is_object() {
                return Err(ValidateError::InvalidRecords(format!(
                    "record {index} is not an object"
                )));
            }
            Ok(serde_json::from_value(item)?)
        })
        .collect()
}

pub fn load_records(path: &Path) -> Result<Vec<Record>, ValidateError> {
    let contents = fs::read_to_string(path)?;
    parse_records(&contents)
}
