use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declared type of a field in the record store.
///
/// Aliases accept the platform's own metadata names so a describe payload
/// can be loaded without translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[serde(alias = "string", alias = "encryptedstring")]
    Text,
    #[serde(alias = "textarea")]
    LongText,
    Email,
    Phone,
    Url,
    #[serde(alias = "int", alias = "long")]
    Integer,
    #[serde(alias = "double")]
    Decimal,
    Currency,
    Percent,
    Date,
    Datetime,
    Boolean,
    #[serde(alias = "picklist", alias = "combobox")]
    SingleSelect,
    #[serde(alias = "multipicklist")]
    MultiSelect,
    Reference,
    #[serde(alias = "id")]
    Identifier,
}

impl FieldType {
    pub fn is_text(self) -> bool {
        matches!(
            self,
            FieldType::Text | FieldType::LongText | FieldType::Email | FieldType::Phone | FieldType::Url
        )
    }

    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::Decimal | FieldType::Currency | FieldType::Percent
        )
    }

    pub fn is_select(self) -> bool {
        matches!(self, FieldType::SingleSelect | FieldType::MultiSelect)
    }

    pub fn is_temporal(self) -> bool {
        matches!(self, FieldType::Date | FieldType::Datetime)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::LongText => "long_text",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Url => "url",
            FieldType::Integer => "integer",
            FieldType::Decimal => "decimal",
            FieldType::Currency => "currency",
            FieldType::Percent => "percent",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Boolean => "boolean",
            FieldType::SingleSelect => "single_select",
            FieldType::MultiSelect => "multi_select",
            FieldType::Reference => "reference",
            FieldType::Identifier => "identifier",
        }
    }
}

/// Field name to declared type, used to format record values for formulas.
pub type FieldTypeMap = HashMap<String, FieldType>;
