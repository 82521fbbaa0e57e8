// SPDX-License-Identifier: Apache-2.0

//! Model definitions: the typed contract a model exposes to a flow.

use crate::schema::SchemaDefinition;
use crate::types::{TypeDescriptor, Value};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A parameter a model accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameter {
    /// The parameter's type.
    pub param_type: TypeDescriptor,

    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Default value used when the job supplies none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl ModelParameter {
    /// Creates a parameter of the given type with no label or default.
    #[must_use]
    pub fn new(param_type: impl Into<TypeDescriptor>) -> Self {
        ModelParameter {
            param_type: param_type.into(),
            label: None,
            default_value: None,
        }
    }

    /// Returns a copy of this parameter with the given default value.
    #[must_use]
    pub fn with_default(mut self, default_value: Value) -> Self {
        self.default_value = Some(default_value);
        self
    }
}

/// The schema contract for one model input.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelInputSchema {
    /// The declared schema; absent for fully dynamic inputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDefinition>,

    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Whether the input may be omitted entirely.
    #[serde(default)]
    pub optional: bool,

    /// Whether the schema is decided at runtime rather than declared.
    #[serde(default)]
    pub dynamic: bool,
}

impl ModelInputSchema {
    /// Creates a static, required input with the given schema.
    #[must_use]
    pub fn of(schema: SchemaDefinition) -> Self {
        ModelInputSchema {
            schema: Some(schema),
            label: None,
            optional: false,
            dynamic: false,
        }
    }
}

/// The schema contract for one model output.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelOutputSchema {
    /// The declared schema; absent for fully dynamic outputs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDefinition>,

    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Whether the output may be absent.
    #[serde(default)]
    pub optional: bool,

    /// Whether the schema is decided at runtime rather than declared.
    #[serde(default)]
    pub dynamic: bool,
}

impl ModelOutputSchema {
    /// Creates a static, required output with the given schema.
    #[must_use]
    pub fn of(schema: SchemaDefinition) -> Self {
        ModelOutputSchema {
            schema: Some(schema),
            label: None,
            optional: false,
            dynamic: false,
        }
    }
}

/// The full contract of a model: parameters, inputs, outputs, resources.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelDefinition {
    /// Parameters by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ModelParameter>,

    /// Inputs by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, ModelInputSchema>,

    /// Outputs by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, ModelOutputSchema>,

    /// External resources by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub resources: IndexMap<String, crate::resource::ResourceDefinition>,
}
