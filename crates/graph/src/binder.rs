// SPDX-License-Identifier: Apache-2.0

//! Attaches runtime information from a job request to graph nodes.
//!
//! Binding is best-effort: a selector that resolves nowhere leaves the node
//! unchanged, since type inference may still fill the gap downstream and
//! validation of the final graph belongs to the caller.

use crate::metadata::NodeMetadata;
use crate::node::GraphSection;
use strata_metadata::{
    FlowNodeType, MetadataBundle, ObjectDefinition, ResourceBundle, RunFlowJob,
};

/// Binds job-supplied values, object references and resources onto a
/// section's nodes, returning the augmented section.
#[must_use]
pub fn bind_job(
    section: GraphSection<NodeMetadata>,
    job: &RunFlowJob,
    metadata: &MetadataBundle,
    resources: &ResourceBundle,
) -> GraphSection<NodeMetadata> {
    let GraphSection {
        nodes,
        inputs,
        outputs,
    } = section;

    let nodes = nodes
        .into_iter()
        .map(|(node_id, node)| {
            let name = node_id.name.as_str();
            let payload = match node.payload.flow_node.node_type {
                FlowNodeType::Parameter => match job.parameters.get(name) {
                    Some(value) => node.payload.clone().with_runtime_value(value.clone()),
                    None => node.payload.clone(),
                },
                FlowNodeType::Input => bind_object(&node.payload, job.inputs.get(name), metadata),
                FlowNodeType::Output => bind_object(&node.payload, job.outputs.get(name), metadata),
                FlowNodeType::Model => bind_object(&node.payload, job.models.get(name), metadata),
                FlowNodeType::Resource => match resources.resolve(name) {
                    Some(resource) => node
                        .payload
                        .clone()
                        .with_runtime_object(ObjectDefinition::Resource(resource.clone())),
                    None => node.payload.clone(),
                },
            };
            let node = node.with_payload(payload);
            (node_id, node)
        })
        .collect();

    GraphSection {
        nodes,
        inputs,
        outputs,
    }
}

fn bind_object(
    payload: &NodeMetadata,
    selector: Option<&strata_metadata::TagSelector>,
    metadata: &MetadataBundle,
) -> NodeMetadata {
    match selector.and_then(|selector| metadata.resolve(selector)) {
        Some(object) => payload.clone().with_runtime_object(object.clone()),
        None => payload.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_flow;
    use crate::error::ErrorCollector;
    use crate::node::{NodeId, NodeNamespace};
    use strata_metadata::{
        FlowDefinition, FlowEdge, FlowNode, FlowSocket, ModelDefinition, ObjectType,
        ResourceDefinition, ResourceType, TagSelector, Value,
    };

    fn flow_with_model() -> FlowDefinition {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("rate".to_owned(), FlowNode::new(FlowNodeType::Parameter));
        let _ = flow
            .nodes
            .insert("feed".to_owned(), FlowNode::new(FlowNodeType::Resource));
        let _ = flow.nodes.insert(
            "calc".to_owned(),
            FlowNode {
                node_type: FlowNodeType::Model,
                parameters: vec!["rate".to_owned()],
                inputs: Vec::new(),
                outputs: vec!["out".to_owned()],
                resources: vec!["feed".to_owned()],
                label: None,
            },
        );
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("rate"),
            FlowSocket::of("calc", "rate"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("feed"),
            FlowSocket::of("calc", "feed"),
        ));
        flow
    }

    #[test]
    fn binder_attaches_values_objects_and_resources() {
        let flow = flow_with_model();
        let mut errors = ErrorCollector::new();
        let namespace = NodeNamespace::root();
        let section = build_flow(&flow, &namespace, &mut errors);
        assert!(errors.is_empty());

        let mut job = RunFlowJob::default();
        let _ = job
            .parameters
            .insert("rate".to_owned(), Value::Float(0.05));
        let _ = job.models.insert(
            "calc".to_owned(),
            TagSelector::latest(ObjectType::Model, "calc_v1"),
        );

        let mut metadata = MetadataBundle::new();
        metadata.add_object("calc_v1", ObjectDefinition::Model(ModelDefinition::default()));

        let mut resources = ResourceBundle::new();
        resources.add_resource(
            "feed",
            ResourceDefinition::new(ResourceType::ExternalSystem, "https"),
        );

        let bound = bind_job(section, &job, &metadata, &resources);

        let rate = &bound.nodes[&NodeId::of("rate", &namespace)];
        assert_eq!(rate.payload.runtime_value, Some(Value::Float(0.05)));

        let calc = &bound.nodes[&NodeId::of("calc", &namespace)];
        assert!(matches!(
            calc.payload.runtime_object,
            Some(ObjectDefinition::Model(_))
        ));

        let feed = &bound.nodes[&NodeId::of("feed", &namespace)];
        assert!(matches!(
            feed.payload.runtime_object,
            Some(ObjectDefinition::Resource(_))
        ));
    }

    #[test]
    fn missing_lookups_leave_nodes_unchanged() {
        let flow = flow_with_model();
        let mut errors = ErrorCollector::new();
        let namespace = NodeNamespace::root();
        let section = build_flow(&flow, &namespace, &mut errors);

        let job = RunFlowJob::default();
        let bound = bind_job(
            section,
            &job,
            &MetadataBundle::new(),
            &ResourceBundle::new(),
        );

        let rate = &bound.nodes[&NodeId::of("rate", &namespace)];
        assert!(rate.payload.runtime_value.is_none());
        let calc = &bound.nodes[&NodeId::of("calc", &namespace)];
        assert!(calc.payload.runtime_object.is_none());
    }
}
