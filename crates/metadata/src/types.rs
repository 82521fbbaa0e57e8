// SPDX-License-Identifier: Apache-2.0

//! The primitive type system and runtime values.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive types understood by the platform.
///
/// Every schema field and every model parameter carries one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BasicType {
    /// True / false.
    Boolean,
    /// Signed 64-bit integer.
    Integer,
    /// 64-bit floating point.
    Float,
    /// Fixed-point decimal, carried as its canonical string form.
    Decimal,
    /// UTF-8 string.
    String,
    /// Calendar date without a time component.
    Date,
    /// Instant in time, UTC.
    Datetime,
}

impl fmt::Display for BasicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BasicType::Boolean => "BOOLEAN",
            BasicType::Integer => "INTEGER",
            BasicType::Float => "FLOAT",
            BasicType::Decimal => "DECIMAL",
            BasicType::String => "STRING",
            BasicType::Date => "DATE",
            BasicType::Datetime => "DATETIME",
        };
        write!(f, "{label}")
    }
}

/// Describes the type of a value or parameter.
///
/// Currently a thin wrapper over [`BasicType`]; kept as a struct so container
/// types can be added without reshaping every signature that names a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescriptor {
    /// The primitive type.
    pub basic_type: BasicType,
}

impl TypeDescriptor {
    /// Creates a descriptor for the given primitive type.
    #[must_use]
    pub fn new(basic_type: BasicType) -> Self {
        TypeDescriptor { basic_type }
    }
}

impl From<BasicType> for TypeDescriptor {
    fn from(basic_type: BasicType) -> Self {
        TypeDescriptor { basic_type }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.basic_type)
    }
}

/// A typed runtime value, e.g. a parameter supplied by a job request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Value {
    /// A boolean value.
    Boolean(bool),
    /// A signed 64-bit integer value.
    Integer(i64),
    /// A 64-bit floating point value.
    Float(f64),
    /// A decimal value in canonical string form.
    Decimal(String),
    /// A string value.
    String(String),
    /// A date value.
    Date(NaiveDate),
    /// A datetime value, UTC.
    Datetime(DateTime<Utc>),
}

impl Value {
    /// Returns the type descriptor for this value.
    #[must_use]
    pub fn type_of(&self) -> TypeDescriptor {
        let basic_type = match self {
            Value::Boolean(_) => BasicType::Boolean,
            Value::Integer(_) => BasicType::Integer,
            Value::Float(_) => BasicType::Float,
            Value::Decimal(_) => BasicType::Decimal,
            Value::String(_) => BasicType::String,
            Value::Date(_) => BasicType::Date,
            Value::Datetime(_) => BasicType::Datetime,
        };
        TypeDescriptor { basic_type }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_reports_its_type() {
        assert_eq!(
            Value::Integer(42).type_of(),
            TypeDescriptor::new(BasicType::Integer)
        );
        assert_eq!(
            Value::String("abc".into()).type_of(),
            TypeDescriptor::new(BasicType::String)
        );
    }

    #[test]
    fn value_round_trips_through_json() {
        let value = Value::Float(1.5);
        let json = serde_json::to_string(&value).expect("serialize");
        let back: Value = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(value, back);
    }
}
