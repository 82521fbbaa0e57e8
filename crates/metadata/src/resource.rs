// SPDX-License-Identifier: Apache-2.0

//! External resource definitions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The category of an external resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
    /// An external system reached over a protocol, e.g. a market data feed.
    ExternalSystem,
    /// A storage location models read from or write to.
    StorageTarget,
}

/// Connection details for an external resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// The resource category.
    pub resource_type: ResourceType,

    /// Access protocol, e.g. `jdbc` or `s3`.
    pub protocol: String,

    /// Protocol refinement, e.g. a JDBC dialect.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_protocol: Option<String>,

    /// System-specific connection properties.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub system: IndexMap<String, String>,
}

impl ResourceDefinition {
    /// Creates a resource of the given type and protocol with no detail.
    #[must_use]
    pub fn new(resource_type: ResourceType, protocol: impl Into<String>) -> Self {
        ResourceDefinition {
            resource_type,
            protocol: protocol.into(),
            sub_protocol: None,
            system: IndexMap::new(),
        }
    }
}
