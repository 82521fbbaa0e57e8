// SPDX-License-Identifier: Apache-2.0

//! Object definitions and tag selectors.
//!
//! An object definition is the unit of the platform's metadata store; a tag
//! selector is a reference to one. The core only ever resolves selectors
//! against an in-memory [`crate::bundle::MetadataBundle`].

use crate::flow::FlowDefinition;
use crate::model::ModelDefinition;
use crate::resource::ResourceDefinition;
use crate::schema::SchemaDefinition;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a metadata object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    /// A model contract.
    Model,
    /// A dataset.
    Data,
    /// A flow definition.
    Flow,
    /// An external resource.
    Resource,
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ObjectType::Model => "MODEL",
            ObjectType::Data => "DATA",
            ObjectType::Flow => "FLOW",
            ObjectType::Resource => "RESOURCE",
        };
        write!(f, "{label}")
    }
}

/// A dataset's metadata: its schema, when declared.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataDefinition {
    /// The dataset's schema; absent for schema-on-read datasets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaDefinition>,
}

/// A metadata object, tagged by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "object_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectDefinition {
    /// A model contract.
    Model(ModelDefinition),
    /// A dataset.
    Data(DataDefinition),
    /// A flow definition.
    Flow(FlowDefinition),
    /// An external resource.
    Resource(ResourceDefinition),
}

impl ObjectDefinition {
    /// Returns the object's kind.
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectDefinition::Model(_) => ObjectType::Model,
            ObjectDefinition::Data(_) => ObjectType::Data,
            ObjectDefinition::Flow(_) => ObjectType::Flow,
            ObjectDefinition::Resource(_) => ObjectType::Resource,
        }
    }

    /// Returns the model contract if this is a model object.
    #[must_use]
    pub fn as_model(&self) -> Option<&ModelDefinition> {
        match self {
            ObjectDefinition::Model(model) => Some(model),
            _ => None,
        }
    }
}

/// A reference to a metadata object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagSelector {
    /// The kind of object the selector refers to.
    pub object_type: ObjectType,

    /// The object's identifier.
    pub object_id: String,

    /// A pinned object version; latest when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
}

impl TagSelector {
    /// Creates a latest-version selector.
    #[must_use]
    pub fn latest(object_type: ObjectType, object_id: impl Into<String>) -> Self {
        TagSelector {
            object_type,
            object_id: object_id.into(),
            version: None,
        }
    }
}

impl fmt::Display for TagSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(version) => write!(f, "{}:{}@{}", self.object_type, self.object_id, version),
            None => write!(f, "{}:{}", self.object_type, self.object_id),
        }
    }
}
