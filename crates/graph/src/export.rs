// SPDX-License-Identifier: Apache-2.0

//! Reconstruction of a flow definition from an execution graph.
//!
//! Export is the inverse of the builder: nodes map back to flow nodes,
//! dependencies back to edges, and contracts carried on node payloads back
//! to the flow's declared maps. For a flow that builds without errors,
//! `export_flow(build_flow(f))` is structurally identical to `f`.

use crate::metadata::NodeMetadata;
use crate::node::GraphSection;
use strata_metadata::{FlowDefinition, FlowEdge, FlowNodeType, FlowSocket};

/// Serializes a graph section back into a flow definition.
#[must_use]
pub fn export_flow(section: &GraphSection<NodeMetadata>) -> FlowDefinition {
    let mut flow = FlowDefinition::default();

    for node in section.nodes.values() {
        let name = node.node_id.name.clone();
        let _ = flow
            .nodes
            .insert(name.clone(), node.payload.flow_node.clone());

        for (socket, source) in &node.dependencies {
            flow.edges.push(FlowEdge::new(
                FlowSocket {
                    node: source.node.name.clone(),
                    socket: source.socket.clone(),
                },
                FlowSocket {
                    node: name.clone(),
                    socket: socket.clone(),
                },
            ));
        }

        match node.payload.flow_node.node_type {
            FlowNodeType::Parameter => {
                if let Some(parameter) = &node.payload.model_parameter {
                    let _ = flow.parameters.insert(name.clone(), parameter.clone());
                }
            }
            FlowNodeType::Input => {
                if let Some(input) = &node.payload.model_input_schema {
                    let _ = flow.inputs.insert(name.clone(), input.clone());
                }
            }
            FlowNodeType::Output => {
                if let Some(output) = &node.payload.model_output_schema {
                    let _ = flow.outputs.insert(name.clone(), output.clone());
                }
            }
            FlowNodeType::Resource => {
                if let Some(resource) = &node.payload.model_resource {
                    let _ = flow.resources.insert(name.clone(), resource.clone());
                }
            }
            FlowNodeType::Model => {}
        }
    }

    flow
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::build_flow;
    use crate::error::ErrorCollector;
    use crate::node::NodeNamespace;
    use pretty_assertions::assert_eq;
    use strata_metadata::{
        BasicType, FieldSchema, FlowNode, ModelInputSchema, SchemaDefinition, TableSchema,
    };

    fn sorted_edges(flow: &FlowDefinition) -> Vec<FlowEdge> {
        let mut edges = flow.edges.clone();
        edges.sort_by_key(|edge| {
            (
                edge.source.node.clone(),
                edge.source.socket.clone(),
                edge.target.node.clone(),
                edge.target.socket.clone(),
            )
        });
        edges
    }

    #[test]
    fn export_round_trips_a_valid_flow() {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("raw".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow
            .nodes
            .insert("rate".to_owned(), FlowNode::new(FlowNodeType::Parameter));
        let _ = flow.nodes.insert(
            "calc".to_owned(),
            FlowNode::model(["rate"], ["raw"], ["pnl"]),
        );
        let _ = flow
            .nodes
            .insert("result".to_owned(), FlowNode::new(FlowNodeType::Output));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("raw"),
            FlowSocket::of("calc", "raw"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("rate"),
            FlowSocket::of("calc", "rate"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::of("calc", "pnl"),
            FlowSocket::node("result"),
        ));
        let _ = flow.inputs.insert(
            "raw".to_owned(),
            ModelInputSchema::of(SchemaDefinition::Table(TableSchema::of(vec![
                FieldSchema::new("price", 0, BasicType::Float),
            ]))),
        );

        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &NodeNamespace::root(), &mut errors);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors.errors());

        let exported = export_flow(&section);

        // Node maps iterate in build order, so compare contents not order.
        assert_eq!(exported.nodes.len(), flow.nodes.len());
        for (name, node) in &flow.nodes {
            assert_eq!(exported.nodes.get(name), Some(node));
        }
        assert_eq!(sorted_edges(&exported), sorted_edges(&flow));
        assert_eq!(exported.inputs, flow.inputs);
        assert_eq!(exported.parameters, flow.parameters);
        assert_eq!(exported.outputs, flow.outputs);
        assert_eq!(exported.resources, flow.resources);
    }
}
