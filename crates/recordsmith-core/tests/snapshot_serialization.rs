use recordsmith_core::{
    FieldDescriptor, FieldType, ObjectSchema, SchemaSnapshot, ValidationRule,
};

#[test]
fn serializes_snapshot_deterministically() {
    let snapshot = SchemaSnapshot {
        schema_version: "0.1".to_string(),
        source: Some("fixture".to_string()),
        objects: vec![ObjectSchema {
            name: "Contact".to_string(),
            label: None,
            fields: vec![FieldDescriptor::new("LastName", FieldType::Text).required()],
            validation_rules: vec![ValidationRule::new(
                "Needs_Last_Name",
                "ISBLANK(LastName)",
                "Last name is required.",
            )],
        }],
    };

    let json = serde_json::to_string_pretty(&snapshot).expect("serialize snapshot");
    let expected = r#"{
  "schema_version": "0.1",
  "source": "fixture",
  "objects": [
    {
      "name": "Contact",
      "fields": [
        {
          "name": "LastName",
          "type": "text",
          "required": true,
          "unique": false,
          "createable": true,
          "calculated": false,
          "auto_number": false
        }
      ],
      "validation_rules": [
        {
          "id": "Needs_Last_Name",
          "active": true,
          "formula": "ISBLANK(LastName)",
          "error_message": "Last name is required."
        }
      ]
    }
  ]
}"#;
    assert_eq!(json, expected);
}
