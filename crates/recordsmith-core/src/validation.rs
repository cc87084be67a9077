use std::collections::BTreeSet;

use crate::error::{Error, Result};
use crate::schema::SchemaSnapshot;

/// Validate internal consistency of a schema snapshot.
///
/// This checks:
/// - duplicate objects/fields/rule ids
/// - rule display fields exist on the object
/// - dependent picklists point at an existing controlling field
pub fn validate_snapshot(snapshot: &SchemaSnapshot) -> Result<()> {
    let mut objects = BTreeSet::new();

    for object in &snapshot.objects {
        if !objects.insert(object.name.to_ascii_lowercase()) {
            return Err(Error::InvalidSnapshot(format!(
                "duplicate object name: {}",
                object.name
            )));
        }

        let mut fields = BTreeSet::new();
        for field in &object.fields {
            if !fields.insert(field.name.to_ascii_lowercase()) {
                return Err(Error::InvalidSnapshot(format!(
                    "duplicate field name: {}.{}",
                    object.name, field.name
                )));
            }
        }

        for field in &object.fields {
            let Some(controlling) = &field.controlling_field else {
                continue;
            };
            if !fields.contains(&controlling.to_ascii_lowercase()) {
                return Err(Error::InvalidSnapshot(format!(
                    "controlling field not found: {}.{} -> {}",
                    object.name, field.name, controlling
                )));
            }
            if controlling.eq_ignore_ascii_case(&field.name) {
                return Err(Error::InvalidSnapshot(format!(
                    "field controls itself: {}.{}",
                    object.name, field.name
                )));
            }
        }

        let mut rules = BTreeSet::new();
        for rule in &object.validation_rules {
            if !rules.insert(rule.id.as_str()) {
                return Err(Error::InvalidSnapshot(format!(
                    "duplicate validation rule id: {}.{}",
                    object.name, rule.id
                )));
            }
            if let Some(display) = &rule.error_display_field {
                if !fields.contains(&display.to_ascii_lowercase()) {
                    return Err(Error::InvalidSnapshot(format!(
                        "error display field not found: {}.{} ({})",
                        object.name, display, rule.id
                    )));
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDescriptor, ObjectSchema, PicklistOption, ValidationRule};
    use crate::types::FieldType;

    fn snapshot(object: ObjectSchema) -> SchemaSnapshot {
        SchemaSnapshot {
            schema_version: crate::SCHEMA_VERSION.to_string(),
            source: None,
            objects: vec![object],
        }
    }

    fn account() -> ObjectSchema {
        ObjectSchema {
            name: "Account".to_string(),
            label: None,
            fields: vec![
                FieldDescriptor::new("Name", FieldType::Text).required(),
                FieldDescriptor::new("Country", FieldType::SingleSelect).with_options(["AU"]),
                FieldDescriptor::new("State", FieldType::SingleSelect)
                    .with_dependent_options("Country", [PicklistOption::new("NSW")]),
            ],
            validation_rules: vec![ValidationRule::new("R1", "ISBLANK(Name)", "Name").on_field("Name")],
        }
    }

    #[test]
    fn accepts_consistent_snapshot() {
        validate_snapshot(&snapshot(account())).expect("valid snapshot");
    }

    #[test]
    fn rejects_duplicate_field() {
        let mut object = account();
        object.fields.push(FieldDescriptor::new("name", FieldType::Text));
        let err = validate_snapshot(&snapshot(object)).expect_err("duplicate field");
        assert!(err.to_string().contains("duplicate field name"));
    }

    #[test]
    fn rejects_unknown_controlling_field() {
        let mut object = account();
        object.fields[2].controlling_field = Some("Region".to_string());
        let err = validate_snapshot(&snapshot(object)).expect_err("unknown controller");
        assert!(err.to_string().contains("controlling field not found"));
    }

    #[test]
    fn rejects_unknown_display_field() {
        let mut object = account();
        object.validation_rules[0].error_display_field = Some("Missing".to_string());
        let err = validate_snapshot(&snapshot(object)).expect_err("unknown display field");
        assert!(err.to_string().contains("error display field not found"));
    }
}
