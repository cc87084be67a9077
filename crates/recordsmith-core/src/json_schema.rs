use jsonschema::JSONSchema;
use schemars::schema_for;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::SchemaSnapshot;

/// JSON Schema describing the snapshot contract.
pub fn snapshot_json_schema() -> Result<Value> {
    let schema = schema_for!(SchemaSnapshot);
    Ok(serde_json::to_value(&schema)?)
}

/// Structural problem found in a snapshot document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotIssue {
    /// JSON pointer to the offending value (`/` for the root).
    pub path: String,
    pub message: String,
}

/// Check a raw snapshot document against a snapshot JSON Schema.
///
/// Returns every violation found; an empty list means the document is
/// structurally valid.
pub fn validate_snapshot_json(snapshot_json: &Value, schema: &Value) -> Result<Vec<SnapshotIssue>> {
    let compiled = JSONSchema::compile(schema).map_err(|err| Error::Schema(err.to_string()))?;

    let mut issues = Vec::new();
    if let Err(errors) = compiled.validate(snapshot_json) {
        for error in errors {
            let path = error.instance_path.to_string();
            issues.push(SnapshotIssue {
                path: if path.is_empty() { "/".to_string() } else { path },
                message: error.to_string(),
            });
        }
    }

    Ok(issues)
}
