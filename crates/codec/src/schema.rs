// SPDX-License-Identifier: Apache-2.0

//! Mapping between platform schemas and arrow schemas.
//!
//! The platform's primitive types map onto a fixed set of arrow types; the
//! data layer never invents wider or narrower representations, so two
//! datasets with the same declared schema always share an arrow schema.

use arrow_schema::{DataType, Field, Schema, SchemaRef, TimeUnit};
use std::sync::Arc;
use strata_metadata::{BasicType, FieldSchema, SchemaDefinition};
use strata_pipeline::Error;

/// Decimal precision carried by the platform's DECIMAL type.
pub const DECIMAL_PRECISION: u8 = 38;

/// Decimal scale carried by the platform's DECIMAL type.
pub const DECIMAL_SCALE: i8 = 12;

/// Maps a platform primitive type to its arrow representation.
#[must_use]
pub fn arrow_type(basic_type: BasicType) -> DataType {
    match basic_type {
        BasicType::Boolean => DataType::Boolean,
        BasicType::Integer => DataType::Int64,
        BasicType::Float => DataType::Float64,
        BasicType::Decimal => DataType::Decimal128(DECIMAL_PRECISION, DECIMAL_SCALE),
        BasicType::String => DataType::Utf8,
        BasicType::Date => DataType::Date32,
        BasicType::Datetime => DataType::Timestamp(TimeUnit::Millisecond, None),
    }
}

/// Maps one platform field to an arrow field.
#[must_use]
pub fn arrow_field(field: &FieldSchema) -> Field {
    Field::new(
        field.field_name.clone(),
        arrow_type(field.field_type),
        !field.not_null,
    )
}

/// Maps a platform schema to an arrow schema.
///
/// # Errors
///
/// Returns a startup error for a struct schema: only tabular schemas have
/// a columnar representation.
pub fn arrow_schema(schema: &SchemaDefinition) -> Result<SchemaRef, Error> {
    let table = match schema {
        SchemaDefinition::Table(table) => table,
        SchemaDefinition::Struct(_) => {
            return Err(Error::startup(
                "Struct schemas have no columnar representation",
            ));
        }
    };
    let fields: Vec<Field> = table.fields.iter().map(arrow_field).collect();
    Ok(Arc::new(Schema::new(fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_metadata::TableSchema;

    #[test]
    fn platform_types_map_to_fixed_arrow_types() {
        assert_eq!(arrow_type(BasicType::Integer), DataType::Int64);
        assert_eq!(arrow_type(BasicType::Float), DataType::Float64);
        assert_eq!(
            arrow_type(BasicType::Decimal),
            DataType::Decimal128(38, 12)
        );
        assert_eq!(
            arrow_type(BasicType::Datetime),
            DataType::Timestamp(TimeUnit::Millisecond, None)
        );
    }

    #[test]
    fn nullability_follows_not_null() {
        let schema = SchemaDefinition::Table(TableSchema::of(vec![
            FieldSchema::new("id", 0, BasicType::Integer).with_not_null(true),
            FieldSchema::new("name", 0, BasicType::String),
        ]));
        let arrow = arrow_schema(&schema).expect("tabular schema");
        assert!(!arrow.field(0).is_nullable());
        assert!(arrow.field(1).is_nullable());
    }

    #[test]
    fn struct_schemas_are_rejected() {
        let schema = SchemaDefinition::Struct(TableSchema::default());
        assert!(arrow_schema(&schema).is_err());
    }
}
