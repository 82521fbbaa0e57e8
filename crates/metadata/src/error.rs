// SPDX-License-Identifier: Apache-2.0

//! Errors for the metadata value model.

/// All errors that can occur while validating metadata values.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A schema declares the same field name more than once.
    ///
    /// Field names are compared case-insensitively, matching the lookup
    /// rules used by the data layer.
    #[error("Duplicate field name `{field_name}` in schema")]
    DuplicateFieldName {
        /// The offending field name, in its first-seen casing.
        field_name: String,
    },

    /// A field's declared order does not match its position in the schema.
    #[error("Field `{field_name}` declares order {declared} but sits at position {position}")]
    FieldOrderMismatch {
        /// The offending field name.
        field_name: String,
        /// The order declared on the field.
        declared: i32,
        /// The actual zero-based position of the field.
        position: i32,
    },

    /// A field references a named enum or named type the schema does not define.
    #[error("Field `{field_name}` references undefined named entry `{reference}`")]
    UndefinedNamedReference {
        /// The offending field name.
        field_name: String,
        /// The missing named enum or named type.
        reference: String,
    },
}
