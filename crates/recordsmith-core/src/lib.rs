//! Core contracts and helpers for recordsmith.
//!
//! This crate defines the schema snapshot types (objects, fields, picklists,
//! validation rules), the record value model shared by the generator and the
//! validators, and the diagnostics every best-effort fallback reports.

pub mod diagnostics;
pub mod error;
pub mod json_schema;
pub mod schema;
pub mod types;
pub mod validation;
pub mod value;

pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use error::{Error, Result};
pub use json_schema::{SnapshotIssue, snapshot_json_schema, validate_snapshot_json};
pub use schema::{FieldDescriptor, ObjectSchema, PicklistOption, SchemaSnapshot, ValidationRule};
pub use types::{FieldType, FieldTypeMap};
pub use validation::validate_snapshot;
pub use value::{MULTI_SELECT_DELIMITER, Record, RecordValue};

/// Current contract version for `snapshot.json` artifacts.
pub const SCHEMA_VERSION: &str = "0.1";
