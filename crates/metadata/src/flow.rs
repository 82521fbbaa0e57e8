// SPDX-License-Identifier: Apache-2.0

//! Flow definitions: the declarative DAG a job executes.
//!
//! A flow names its nodes and wires them with edges between sockets. The
//! reserved empty socket name denotes the single input or output of nodes
//! that have exactly one.

use crate::model::{ModelInputSchema, ModelOutputSchema, ModelParameter};
use crate::resource::ResourceDefinition;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// The reserved socket name for nodes with a single input or output.
pub const SINGLE_SOCKET: &str = "";

/// The kind of a flow node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlowNodeType {
    /// A dataset flowing into the graph.
    Input,
    /// A dataset flowing out of the graph.
    Output,
    /// A scalar parameter value.
    Parameter,
    /// An external resource binding.
    Resource,
    /// A model execution step.
    Model,
}

/// One node of a flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowNode {
    /// The node kind.
    pub node_type: FlowNodeType,

    /// Parameter names a model node consumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,

    /// Input socket names a model node consumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,

    /// Output socket names a model node produces.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,

    /// Resource names a model node consumes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,

    /// Optional human-readable label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl FlowNode {
    /// Creates a node of the given kind with no declared sockets.
    #[must_use]
    pub fn new(node_type: FlowNodeType) -> Self {
        FlowNode {
            node_type,
            parameters: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            resources: Vec::new(),
            label: None,
        }
    }

    /// Creates a model node with the given socket lists.
    #[must_use]
    pub fn model(
        parameters: impl IntoIterator<Item = impl Into<String>>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        FlowNode {
            node_type: FlowNodeType::Model,
            parameters: parameters.into_iter().map(Into::into).collect(),
            inputs: inputs.into_iter().map(Into::into).collect(),
            outputs: outputs.into_iter().map(Into::into).collect(),
            resources: Vec::new(),
            label: None,
        }
    }
}

/// A named socket on a named flow node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowSocket {
    /// The node name.
    pub node: String,

    /// The socket name; [`SINGLE_SOCKET`] for single-socket nodes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub socket: String,
}

impl FlowSocket {
    /// A socket on a single-socket node.
    #[must_use]
    pub fn node(node: impl Into<String>) -> Self {
        FlowSocket {
            node: node.into(),
            socket: SINGLE_SOCKET.to_owned(),
        }
    }

    /// A named socket on a multi-socket node.
    #[must_use]
    pub fn of(node: impl Into<String>, socket: impl Into<String>) -> Self {
        FlowSocket {
            node: node.into(),
            socket: socket.into(),
        }
    }
}

/// A directed edge between two sockets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowEdge {
    /// The producing socket.
    pub source: FlowSocket,

    /// The consuming socket.
    pub target: FlowSocket,
}

impl FlowEdge {
    /// Creates an edge from source to target.
    #[must_use]
    pub fn new(source: FlowSocket, target: FlowSocket) -> Self {
        FlowEdge { source, target }
    }
}

/// A complete flow: nodes, edges and optional declared contracts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Nodes by name, in declaration order.
    pub nodes: IndexMap<String, FlowNode>,

    /// Edges wiring the nodes together.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub edges: Vec<FlowEdge>,

    /// Declared parameter contracts by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, ModelParameter>,

    /// Declared input contracts by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, ModelInputSchema>,

    /// Declared output contracts by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, ModelOutputSchema>,

    /// Declared resource contracts by name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub resources: IndexMap<String, ResourceDefinition>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_round_trips_through_json() {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("input".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow.nodes.insert(
            "model".to_owned(),
            FlowNode::model(["rate"], ["input"], ["output"]),
        );
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("input"),
            FlowSocket::of("model", "input"),
        ));

        let json = serde_json::to_string(&flow).expect("serialize");
        let back: FlowDefinition = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(flow, back);
    }
}
