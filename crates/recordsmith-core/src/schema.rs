use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::types::{FieldType, FieldTypeMap};

/// Top-level snapshot of the record store metadata captured by the client.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SchemaSnapshot {
    /// Contract version for this snapshot format.
    pub schema_version: String,
    /// Where the snapshot came from (org alias, `anonymized`, fixture name).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Objects captured from the store.
    pub objects: Vec<ObjectSchema>,
}

impl SchemaSnapshot {
    pub fn object(&self, name: &str) -> Option<&ObjectSchema> {
        self.objects
            .iter()
            .find(|object| object.name.eq_ignore_ascii_case(name))
    }
}

/// One object (record type) with its fields and validation rules.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ObjectSchema {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
}

impl ObjectSchema {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields
            .iter()
            .find(|field| field.name.eq_ignore_ascii_case(name))
    }

    /// Map of field name to declared type for formula evaluation.
    pub fn field_type_map(&self) -> FieldTypeMap {
        self.fields
            .iter()
            .map(|field| (field.name.clone(), field.field_type))
            .collect()
    }

    pub fn active_rules(&self) -> impl Iterator<Item = &ValidationRule> {
        self.validation_rules.iter().filter(|rule| rule.active)
    }
}

/// Field metadata for an object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    /// Picklist values in declared order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PicklistOption>,
    /// Controlling field for dependent picklists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controlling_field: Option<String>,
    /// Target objects for reference fields.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference_to: Vec<String>,
    #[serde(default = "default_true")]
    pub createable: bool,
    #[serde(default)]
    pub calculated: bool,
    #[serde(default)]
    pub auto_number: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            label: None,
            field_type,
            required: false,
            unique: false,
            max_length: None,
            precision: None,
            scale: None,
            options: Vec::new(),
            controlling_field: None,
            reference_to: Vec::new(),
            createable: true,
            calculated: false,
            auto_number: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn with_max_length(mut self, max_length: u32) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn with_precision(mut self, precision: u32, scale: u32) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    pub fn with_options<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = values.into_iter().map(PicklistOption::new).collect();
        self
    }

    pub fn with_dependent_options<I>(mut self, controlling: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = PicklistOption>,
    {
        self.controlling_field = Some(controlling.into());
        self.options = options.into_iter().collect();
        self
    }

    /// Fields the generator must populate; derived and system fields are skipped.
    pub fn is_generatable(&self) -> bool {
        self.createable
            && !self.calculated
            && !self.auto_number
            && self.field_type != FieldType::Identifier
    }

    /// Active picklist values in declared order.
    pub fn active_options(&self) -> Vec<&str> {
        self.options
            .iter()
            .filter(|option| option.active)
            .map(|option| option.value.as_str())
            .collect()
    }

    pub fn has_option(&self, value: &str) -> bool {
        self.options
            .iter()
            .any(|option| option.active && option.value == value)
    }
}

/// One picklist value, optionally carrying a validity bitmap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PicklistOption {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub default_value: bool,
    /// Base64 bitmap over the controlling field's active values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_for: Option<String>,
}

impl PicklistOption {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: None,
            active: true,
            default_value: false,
            valid_for: None,
        }
    }

    pub fn valid_for(mut self, bitmap: impl Into<String>) -> Self {
        self.valid_for = Some(bitmap.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

/// Declarative validation rule; a truthy formula blocks the insert.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ValidationRule {
    pub id: String,
    #[serde(default = "default_true")]
    pub active: bool,
    pub formula: String,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_display_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ValidationRule {
    pub fn new(
        id: impl Into<String>,
        formula: impl Into<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            active: true,
            formula: formula.into(),
            error_message: error_message.into(),
            error_display_field: None,
            description: None,
        }
    }

    pub fn on_field(mut self, field: impl Into<String>) -> Self {
        self.error_display_field = Some(field.into());
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}
