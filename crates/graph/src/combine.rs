// SPDX-License-Identifier: Apache-2.0

//! Schema combination rules used by type inference.
//!
//! When one socket feeds several model inputs, the inferred schema must
//! satisfy every target at once. Combination is associative and commutative
//! on the compatible subset, so the fold order across targets does not
//! matter:
//!
//! - field names match case-insensitively; first-seen casing and order win,
//!   new fields append with the next field order
//! - `not_null` only ever tightens (true wins)
//! - `field_type`, `categorical` and `business_key` must agree exactly
//! - named enums intersect their values; an empty intersection is a conflict
//! - named types combine recursively

use crate::error::SchemaConflict;
use indexmap::IndexMap;
use strata_metadata::{
    FieldSchema, ModelInputSchema, ResourceDefinition, SchemaDefinition, TableSchema,
};

/// Combines two input schema contracts.
///
/// `optional` and `dynamic` are AND-joined: the combined input is optional
/// only if every target allows omission, and dynamic only if no target pins
/// a static schema. When the result is static, the declared schemas combine
/// field-by-field.
pub fn combine_input_schemas(
    a: &ModelInputSchema,
    b: &ModelInputSchema,
) -> Result<ModelInputSchema, SchemaConflict> {
    let optional = a.optional && b.optional;
    let dynamic = a.dynamic && b.dynamic;

    let schema = if dynamic {
        None
    } else {
        match (&a.schema, &b.schema) {
            (Some(left), Some(right)) => Some(combine_schemas(left, right)?),
            (Some(left), None) => Some(left.clone()),
            (None, Some(right)) => Some(right.clone()),
            (None, None) => None,
        }
    };

    Ok(ModelInputSchema {
        schema,
        label: a.label.clone().or_else(|| b.label.clone()),
        optional,
        dynamic,
    })
}

/// Combines two schema definitions of the same variant.
pub fn combine_schemas(
    a: &SchemaDefinition,
    b: &SchemaDefinition,
) -> Result<SchemaDefinition, SchemaConflict> {
    match (a, b) {
        (SchemaDefinition::Table(left), SchemaDefinition::Table(right)) => {
            Ok(SchemaDefinition::Table(combine_tables(left, right)?))
        }
        (SchemaDefinition::Struct(left), SchemaDefinition::Struct(right)) => {
            Ok(SchemaDefinition::Struct(combine_tables(left, right)?))
        }
        _ => Err(SchemaConflict::new(
            "Cannot combine a table schema with a struct schema",
        )),
    }
}

fn combine_tables(a: &TableSchema, b: &TableSchema) -> Result<TableSchema, SchemaConflict> {
    let mut fields = a.fields.clone();

    for incoming in &b.fields {
        let existing = fields
            .iter_mut()
            .find(|field| field.field_name.eq_ignore_ascii_case(&incoming.field_name));
        match existing {
            Some(field) => *field = combine_fields(field, incoming)?,
            None => {
                let mut appended = incoming.clone();
                appended.field_order = fields.len() as i32;
                fields.push(appended);
            }
        }
    }

    let named_enums = combine_named_enums(&a.named_enums, &b.named_enums)?;
    let named_types = combine_named_types(&a.named_types, &b.named_types)?;

    Ok(TableSchema {
        fields,
        named_enums,
        named_types,
    })
}

fn combine_fields(a: &FieldSchema, b: &FieldSchema) -> Result<FieldSchema, SchemaConflict> {
    if a.field_type != b.field_type {
        return Err(SchemaConflict::new(format!(
            "Field {} is used with conflicting types {} and {}",
            a.field_name, a.field_type, b.field_type
        )));
    }
    if a.categorical != b.categorical {
        return Err(SchemaConflict::new(format!(
            "Field {} has conflicting categorical flags",
            a.field_name
        )));
    }
    if a.business_key != b.business_key {
        return Err(SchemaConflict::new(format!(
            "Field {} has conflicting business key flags",
            a.field_name
        )));
    }

    let named_enum = combine_named_ref(&a.field_name, &a.named_enum, &b.named_enum)?;
    let named_type = combine_named_ref(&a.field_name, &a.named_type, &b.named_type)?;

    Ok(FieldSchema {
        field_name: a.field_name.clone(),
        field_order: a.field_order,
        field_type: a.field_type,
        label: a.label.clone().or_else(|| b.label.clone()),
        business_key: a.business_key,
        categorical: a.categorical,
        not_null: a.not_null || b.not_null,
        named_enum,
        named_type,
    })
}

fn combine_named_ref(
    field_name: &str,
    a: &Option<String>,
    b: &Option<String>,
) -> Result<Option<String>, SchemaConflict> {
    match (a, b) {
        (Some(left), Some(right)) if left != right => Err(SchemaConflict::new(format!(
            "Field {field_name} references conflicting named entries {left} and {right}"
        ))),
        (Some(left), _) => Ok(Some(left.clone())),
        (None, right) => Ok(right.clone()),
    }
}

fn combine_named_enums(
    a: &IndexMap<String, Vec<String>>,
    b: &IndexMap<String, Vec<String>>,
) -> Result<IndexMap<String, Vec<String>>, SchemaConflict> {
    let mut combined = a.clone();
    for (name, incoming) in b {
        match combined.get_mut(name) {
            Some(values) => {
                values.retain(|value| incoming.contains(value));
                if values.is_empty() {
                    return Err(SchemaConflict::new(format!(
                        "Named enum {name} has no values common to all uses"
                    )));
                }
            }
            None => {
                let _ = combined.insert(name.clone(), incoming.clone());
            }
        }
    }
    Ok(combined)
}

fn combine_named_types(
    a: &IndexMap<String, SchemaDefinition>,
    b: &IndexMap<String, SchemaDefinition>,
) -> Result<IndexMap<String, SchemaDefinition>, SchemaConflict> {
    let mut combined = a.clone();
    for (name, incoming) in b {
        match combined.get(name) {
            Some(existing) => {
                let merged = combine_schemas(existing, incoming)?;
                let _ = combined.insert(name.clone(), merged);
            }
            None => {
                let _ = combined.insert(name.clone(), incoming.clone());
            }
        }
    }
    Ok(combined)
}

/// Combines two resource contracts.
///
/// Types must match; protocols propagate when one side leaves them blank
/// and conflict otherwise. Divergent system detail degrades to an empty
/// map while the protocol is kept, since detail maps are advisory.
pub fn combine_resources(
    a: &ResourceDefinition,
    b: &ResourceDefinition,
) -> Result<ResourceDefinition, SchemaConflict> {
    if a.resource_type != b.resource_type {
        return Err(SchemaConflict::new(
            "Resource is used with conflicting resource types",
        ));
    }

    let protocol = match (a.protocol.is_empty(), b.protocol.is_empty()) {
        (false, false) if a.protocol != b.protocol => {
            return Err(SchemaConflict::new(format!(
                "Resource is used with conflicting protocols {} and {}",
                a.protocol, b.protocol
            )));
        }
        (false, _) => a.protocol.clone(),
        (true, _) => b.protocol.clone(),
    };

    let sub_protocol = match (&a.sub_protocol, &b.sub_protocol) {
        (Some(left), Some(right)) if left != right => {
            return Err(SchemaConflict::new(format!(
                "Resource is used with conflicting sub-protocols {left} and {right}"
            )));
        }
        (Some(left), _) => Some(left.clone()),
        (None, right) => right.clone(),
    };

    let system = if a.system == b.system {
        a.system.clone()
    } else {
        IndexMap::new()
    };

    Ok(ResourceDefinition {
        resource_type: a.resource_type,
        protocol,
        sub_protocol,
        system,
    })
}
