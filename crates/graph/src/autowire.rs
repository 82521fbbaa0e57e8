// SPDX-License-Identifier: Apache-2.0

//! Auto-wiring of model parameters.
//!
//! Models frequently declare housekeeping parameters the flow author never
//! wires explicitly. After binding, every parameter declared by a bound
//! model must be connected; this pass synthesizes the missing parameter
//! nodes and edges.
//!
//! Flows that declare an explicit parameter contract opt out of free
//! wiring: a model parameter absent from the contract is an error rather
//! than a silently added graph input.

use crate::error::ErrorHandler;
use crate::metadata::NodeMetadata;
use crate::node::{GraphSection, Node, NodeId, NodeNamespace, SocketId};
use indexmap::IndexMap;
use strata_metadata::{FlowDefinition, FlowNode, FlowNodeType, RunFlowJob};

/// Connects every parameter declared by a bound model, synthesizing
/// parameter nodes where the flow does not provide them.
#[must_use]
pub fn autowire_parameters(
    section: GraphSection<NodeMetadata>,
    flow: &FlowDefinition,
    job: &RunFlowJob,
    namespace: &NodeNamespace,
    handler: &mut dyn ErrorHandler,
) -> GraphSection<NodeMetadata> {
    // Explicit flows declare their parameter contract up front.
    let explicit = !flow.parameters.is_empty();

    let GraphSection {
        mut nodes,
        mut inputs,
        outputs,
    } = section;

    let model_ids: Vec<NodeId> = nodes
        .values()
        .filter(|node| node.payload.flow_node.node_type == FlowNodeType::Model)
        .map(|node| node.node_id.clone())
        .collect();

    for model_id in model_ids {
        let Some(model) = nodes[&model_id]
            .payload
            .runtime_object
            .as_ref()
            .and_then(|object| object.as_model())
            .cloned()
        else {
            continue;
        };

        for (param_name, _) in &model.parameters {
            let node = &nodes[&model_id];
            let declared_on_node = node.payload.flow_node.parameters.contains(param_name);
            if declared_on_node && node.dependencies.contains_key(param_name) {
                continue;
            }

            if explicit && !declared_on_node && !flow.parameters.contains_key(param_name) {
                handler.on_error(
                    &model_id,
                    &format!("Parameter {param_name} is not declared in the flow"),
                );
                continue;
            }

            let param_id = NodeId::of(param_name, namespace);
            if !nodes.contains_key(&param_id) {
                let mut payload = NodeMetadata::new(FlowNode::new(FlowNodeType::Parameter));
                if let Some(value) = job.parameters.get(param_name) {
                    payload = payload.with_runtime_value(value.clone());
                }
                let param_node = Node {
                    node_id: param_id.clone(),
                    dependencies: IndexMap::new(),
                    outputs: vec![String::new()],
                    payload,
                };
                let _ = nodes.insert(param_id.clone(), param_node);
                inputs.push(param_id.clone());
            }

            // Re-insert keeps the model node's position in the section.
            let mut updated = nodes[&model_id].clone();
            if !updated.payload.flow_node.parameters.contains(param_name) {
                let mut flow_node = updated.payload.flow_node.clone();
                flow_node.parameters.push(param_name.clone());
                updated.payload.flow_node = flow_node;
            }
            let _ = updated
                .dependencies
                .insert(param_name.clone(), SocketId::single(param_id));
            let _ = nodes.insert(model_id.clone(), updated);
        }
    }

    GraphSection {
        nodes,
        inputs,
        outputs,
    }
}
