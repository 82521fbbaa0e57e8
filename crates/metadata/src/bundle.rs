// SPDX-License-Identifier: Apache-2.0

//! Read-only lookup bundles handed to the graph core.
//!
//! Bundles are assembled by the surrounding services before a graph build
//! and never mutated during one. Lookups are by object type + id; version
//! pinning is resolved upstream, so a bundle holds exactly one definition
//! per selector.

use crate::object::{ObjectDefinition, ObjectType, TagSelector};
use crate::resource::ResourceDefinition;
use std::collections::HashMap;

/// A read-only map from tag selector to object definition.
#[derive(Debug, Clone, Default)]
pub struct MetadataBundle {
    objects: HashMap<(ObjectType, String), ObjectDefinition>,
}

impl MetadataBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        MetadataBundle {
            objects: HashMap::new(),
        }
    }

    /// Adds an object under the given id, keyed by the object's own type.
    /// Replaces any previous entry for the same selector.
    pub fn add_object(&mut self, object_id: impl Into<String>, object: ObjectDefinition) {
        let _ = self
            .objects
            .insert((object.object_type(), object_id.into()), object);
    }

    /// Resolves a selector, ignoring version pinning.
    #[must_use]
    pub fn resolve(&self, selector: &TagSelector) -> Option<&ObjectDefinition> {
        self.objects
            .get(&(selector.object_type, selector.object_id.clone()))
    }

    /// Number of objects in the bundle.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if the bundle holds no objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// A read-only map from resource name to resource definition.
#[derive(Debug, Clone, Default)]
pub struct ResourceBundle {
    resources: HashMap<String, ResourceDefinition>,
}

impl ResourceBundle {
    /// Creates an empty bundle.
    #[must_use]
    pub fn new() -> Self {
        ResourceBundle {
            resources: HashMap::new(),
        }
    }

    /// Adds a resource under the given name, replacing any previous entry.
    pub fn add_resource(&mut self, name: impl Into<String>, resource: ResourceDefinition) {
        let _ = self.resources.insert(name.into(), resource);
    }

    /// Looks a resource up by name.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&ResourceDefinition> {
        self.resources.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDefinition;
    use crate::resource::ResourceType;

    #[test]
    fn bundle_resolves_by_type_and_id() {
        let mut bundle = MetadataBundle::new();
        bundle.add_object("m1", ObjectDefinition::Model(ModelDefinition::default()));

        let hit = bundle.resolve(&TagSelector::latest(ObjectType::Model, "m1"));
        assert!(hit.is_some());

        let miss = bundle.resolve(&TagSelector::latest(ObjectType::Data, "m1"));
        assert!(miss.is_none());
    }

    #[test]
    fn resource_bundle_resolves_by_name() {
        let mut bundle = ResourceBundle::new();
        bundle.add_resource(
            "rates_feed",
            ResourceDefinition::new(ResourceType::ExternalSystem, "https"),
        );
        assert!(bundle.resolve("rates_feed").is_some());
        assert!(bundle.resolve("other").is_none());
    }
}
