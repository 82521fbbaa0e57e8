// SPDX-License-Identifier: Apache-2.0

//! Tabular schemas.
//!
//! A schema is an ordered list of fields; field order is an invariant set at
//! insertion time and preserved by every transformation. Struct schemas share
//! the table shape and differ only in how they are combined (recursively
//! through the named-type map).

use crate::error::Error;
use crate::types::BasicType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A single field in a tabular schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSchema {
    /// Field name, unique within the schema (case-insensitively).
    pub field_name: String,

    /// Zero-based position of the field, assigned at insertion.
    pub field_order: i32,

    /// The field's primitive type.
    pub field_type: BasicType,

    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Whether the field participates in the business key.
    #[serde(default)]
    pub business_key: bool,

    /// Whether the field holds categorical data.
    #[serde(default)]
    pub categorical: bool,

    /// Whether nulls are forbidden.
    #[serde(default)]
    pub not_null: bool,

    /// Name of a named enum constraining this field's values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_enum: Option<String>,

    /// Name of a named type elaborating this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_type: Option<String>,
}

impl FieldSchema {
    /// Creates a field with the given name, order and type; all flags off.
    #[must_use]
    pub fn new(field_name: impl Into<String>, field_order: i32, field_type: BasicType) -> Self {
        FieldSchema {
            field_name: field_name.into(),
            field_order,
            field_type,
            label: None,
            business_key: false,
            categorical: false,
            not_null: false,
            named_enum: None,
            named_type: None,
        }
    }

    /// Returns a copy of this field with `not_null` set as given.
    #[must_use]
    pub fn with_not_null(mut self, not_null: bool) -> Self {
        self.not_null = not_null;
        self
    }

    /// Returns a copy of this field with `categorical` set as given.
    #[must_use]
    pub fn with_categorical(mut self, categorical: bool) -> Self {
        self.categorical = categorical;
        self
    }

    /// Returns a copy of this field with `business_key` set as given.
    #[must_use]
    pub fn with_business_key(mut self, business_key: bool) -> Self {
        self.business_key = business_key;
        self
    }
}

/// An ordered list of fields plus optional named enums and named types.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TableSchema {
    /// The fields, in declaration order.
    pub fields: Vec<FieldSchema>,

    /// Named enums referenced by fields, keyed by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub named_enums: IndexMap<String, Vec<String>>,

    /// Named types referenced by fields, keyed by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub named_types: IndexMap<String, SchemaDefinition>,
}

impl TableSchema {
    /// Builds a schema from a list of fields, assigning field order by position.
    #[must_use]
    pub fn of(fields: impl IntoIterator<Item = FieldSchema>) -> Self {
        let fields = fields
            .into_iter()
            .enumerate()
            .map(|(position, mut field)| {
                field.field_order = position as i32;
                field
            })
            .collect();
        TableSchema {
            fields,
            named_enums: IndexMap::new(),
            named_types: IndexMap::new(),
        }
    }

    /// Looks a field up by name, case-insensitively.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields
            .iter()
            .find(|field| field.field_name.eq_ignore_ascii_case(name))
    }

    /// Checks internal consistency: unique field names, contiguous field
    /// order, and resolvable named references.
    pub fn validate(&self) -> Result<(), Error> {
        for (position, field) in self.fields.iter().enumerate() {
            let duplicate = self.fields[..position]
                .iter()
                .any(|prior| prior.field_name.eq_ignore_ascii_case(&field.field_name));
            if duplicate {
                return Err(Error::DuplicateFieldName {
                    field_name: field.field_name.clone(),
                });
            }
            if field.field_order != position as i32 {
                return Err(Error::FieldOrderMismatch {
                    field_name: field.field_name.clone(),
                    declared: field.field_order,
                    position: position as i32,
                });
            }
            if let Some(named_enum) = &field.named_enum {
                if !self.named_enums.contains_key(named_enum) {
                    return Err(Error::UndefinedNamedReference {
                        field_name: field.field_name.clone(),
                        reference: named_enum.clone(),
                    });
                }
            }
            if let Some(named_type) = &field.named_type {
                if !self.named_types.contains_key(named_type) {
                    return Err(Error::UndefinedNamedReference {
                        field_name: field.field_name.clone(),
                        reference: named_type.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A schema definition, either tabular or structured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SchemaDefinition {
    /// A flat tabular schema.
    Table(TableSchema),
    /// A structured schema; combined recursively through named types.
    Struct(TableSchema),
}

impl SchemaDefinition {
    /// Returns the underlying table shape, whichever variant this is.
    #[must_use]
    pub fn table(&self) -> &TableSchema {
        match self {
            SchemaDefinition::Table(table) | SchemaDefinition::Struct(table) => table,
        }
    }

    /// Checks internal consistency of the underlying table shape.
    pub fn validate(&self) -> Result<(), Error> {
        self.table().validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_schema() -> TableSchema {
        TableSchema::of([
            FieldSchema::new("id", 0, BasicType::Integer).with_not_null(true),
            FieldSchema::new("name", 0, BasicType::String),
        ])
    }

    #[test]
    fn of_assigns_field_order_by_position() {
        let schema = simple_schema();
        assert_eq!(schema.fields[0].field_order, 0);
        assert_eq!(schema.fields[1].field_order, 1);
        schema.validate().expect("schema is consistent");
    }

    #[test]
    fn field_lookup_is_case_insensitive() {
        let schema = simple_schema();
        let field = schema.field("NAME").expect("field found");
        assert_eq!(field.field_name, "name");
    }

    #[test]
    fn duplicate_field_names_fail_validation() {
        let schema = TableSchema::of([
            FieldSchema::new("price", 0, BasicType::Float),
            FieldSchema::new("Price", 0, BasicType::Float),
        ]);
        assert!(matches!(
            schema.validate(),
            Err(Error::DuplicateFieldName { .. })
        ));
    }

    #[test]
    fn undefined_named_enum_fails_validation() {
        let mut field = FieldSchema::new("ccy", 0, BasicType::String);
        field.named_enum = Some("currencies".into());
        let schema = TableSchema::of([field]);
        assert!(matches!(
            schema.validate(),
            Err(Error::UndefinedNamedReference { .. })
        ));
    }
}
