// SPDX-License-Identifier: Apache-2.0

//! The payload carried by execution graph nodes.

use strata_metadata::{
    FlowNode, ModelInputSchema, ModelOutputSchema, ModelParameter, ObjectDefinition,
    ResourceDefinition, Value,
};

/// Metadata accumulated on a graph node across the compilation passes.
///
/// The builder seeds each node with its flow node and any contract declared
/// on the flow; the binder attaches runtime objects and values; inference
/// fills whatever contract is still missing. Updates are copy-on-write:
/// every `with_*` builder returns a new instance, leaving prior graph
/// sections untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMetadata {
    /// The flow node this graph node was expanded from.
    pub flow_node: FlowNode,

    /// Parameter contract, declared or inferred.
    pub model_parameter: Option<ModelParameter>,

    /// Input schema contract, declared or inferred.
    pub model_input_schema: Option<ModelInputSchema>,

    /// Output schema contract, declared or inferred.
    pub model_output_schema: Option<ModelOutputSchema>,

    /// Resource contract, declared or inferred.
    pub model_resource: Option<ResourceDefinition>,

    /// The metadata object bound from the job request.
    pub runtime_object: Option<ObjectDefinition>,

    /// The runtime value bound from the job request.
    pub runtime_value: Option<Value>,
}

impl NodeMetadata {
    /// Creates metadata carrying only the flow node.
    #[must_use]
    pub fn new(flow_node: FlowNode) -> Self {
        NodeMetadata {
            flow_node,
            model_parameter: None,
            model_input_schema: None,
            model_output_schema: None,
            model_resource: None,
            runtime_object: None,
            runtime_value: None,
        }
    }

    /// Returns a copy with the parameter contract set.
    #[must_use]
    pub fn with_model_parameter(mut self, model_parameter: ModelParameter) -> Self {
        self.model_parameter = Some(model_parameter);
        self
    }

    /// Returns a copy with the input schema contract set.
    #[must_use]
    pub fn with_model_input_schema(mut self, model_input_schema: ModelInputSchema) -> Self {
        self.model_input_schema = Some(model_input_schema);
        self
    }

    /// Returns a copy with the output schema contract set.
    #[must_use]
    pub fn with_model_output_schema(mut self, model_output_schema: ModelOutputSchema) -> Self {
        self.model_output_schema = Some(model_output_schema);
        self
    }

    /// Returns a copy with the resource contract set.
    #[must_use]
    pub fn with_model_resource(mut self, model_resource: ResourceDefinition) -> Self {
        self.model_resource = Some(model_resource);
        self
    }

    /// Returns a copy with the runtime object set.
    #[must_use]
    pub fn with_runtime_object(mut self, runtime_object: ObjectDefinition) -> Self {
        self.runtime_object = Some(runtime_object);
        self
    }

    /// Returns a copy with the runtime value set.
    #[must_use]
    pub fn with_runtime_value(mut self, runtime_value: Value) -> Self {
        self.runtime_value = Some(runtime_value);
        self
    }
}
