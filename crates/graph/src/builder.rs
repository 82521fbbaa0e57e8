// SPDX-License-Identifier: Apache-2.0

//! Topological expansion of a flow definition into an execution graph.
//!
//! The builder runs Kahn's algorithm over the declared edges: input,
//! parameter and resource nodes seed the reachable set, and a node is
//! expanded once every edge feeding it has been consumed. Nodes are
//! expanded in the order they became reachable, which makes builds
//! deterministic for a given flow.
//!
//! Structural defects (duplicate socket feeds, unsupplied sockets,
//! unreachable nodes) are reported through the error handler; the build
//! always returns a section containing every node it could expand.

use crate::error::ErrorHandler;
use crate::metadata::NodeMetadata;
use crate::node::{GraphSection, Node, NodeId, NodeNamespace, SocketId};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet, VecDeque};
use strata_metadata::{FlowDefinition, FlowEdge, FlowNode, FlowNodeType};

/// Renders a socket for error messages: the bare node name for the
/// reserved single socket, `node.socket` otherwise.
pub(crate) fn socket_display(node: &NodeId, socket: &str) -> String {
    if socket.is_empty() {
        node.name.clone()
    } else {
        format!("{}.{}", node.name, socket)
    }
}

/// Expands a flow definition into a graph section in the given namespace.
///
/// The returned section contains one node per reachable flow node, in the
/// order they became reachable; `inputs` and `outputs` hold the section
/// boundary. Semantic defects go through `handler` and do not abort the
/// build.
pub fn build_flow(
    flow: &FlowDefinition,
    namespace: &NodeNamespace,
    handler: &mut dyn ErrorHandler,
) -> GraphSection<NodeMetadata> {
    let node_ids: IndexMap<&str, NodeId> = flow
        .nodes
        .keys()
        .map(|name| (name.as_str(), NodeId::of(name, namespace)))
        .collect();

    // Keep only edges whose endpoints exist; dangling references are
    // reported against an id synthesized for the unknown name.
    let mut edges: Vec<&FlowEdge> = Vec::with_capacity(flow.edges.len());
    for edge in &flow.edges {
        let mut endpoints_ok = true;
        for endpoint in [&edge.source, &edge.target] {
            if !node_ids.contains_key(endpoint.node.as_str()) {
                handler.on_error(
                    &NodeId::of(&endpoint.node, namespace),
                    &format!("Edge references unknown flow node {}", endpoint.node),
                );
                endpoints_ok = false;
            }
        }
        if endpoints_ok {
            edges.push(edge);
        }
    }

    let mut inbound: HashMap<&str, Vec<&FlowEdge>> = HashMap::new();
    let mut outbound: HashMap<&str, Vec<&FlowEdge>> = HashMap::new();
    for &edge in &edges {
        inbound.entry(edge.target.node.as_str()).or_default().push(edge);
        outbound.entry(edge.source.node.as_str()).or_default().push(edge);
    }

    report_duplicate_feeds(&node_ids, &inbound, handler);

    // Remaining inbound edges per node; a node becomes reachable when its
    // list drains. Seeds are the source node types.
    let mut remaining: HashMap<&str, Vec<&FlowEdge>> = flow
        .nodes
        .keys()
        .map(|name| {
            let name = name.as_str();
            (name, inbound.get(name).cloned().unwrap_or_default())
        })
        .collect();

    let mut reachable: VecDeque<&str> = VecDeque::new();
    let mut seen: HashSet<&str> = HashSet::new();
    for (name, flow_node) in &flow.nodes {
        let seed = matches!(
            flow_node.node_type,
            FlowNodeType::Input | FlowNodeType::Parameter | FlowNodeType::Resource
        );
        if seed {
            reachable.push_back(name.as_str());
            let _ = seen.insert(name.as_str());
        }
    }

    let mut nodes: IndexMap<NodeId, Node<NodeMetadata>> = IndexMap::new();
    while let Some(name) = reachable.pop_front() {
        let node_id = node_ids[name].clone();
        let flow_node = &flow.nodes[name];
        let node_inbound = inbound.get(name).map(Vec::as_slice).unwrap_or(&[]);
        let node = build_node(node_id.clone(), flow, flow_node, node_inbound, &node_ids, handler);
        let _ = nodes.insert(node_id, node);

        for edge in outbound.get(name).into_iter().flatten() {
            let target = edge.target.node.as_str();
            let Some(target_remaining) = remaining.get_mut(target) else {
                continue;
            };
            if let Some(position) = target_remaining.iter().position(|e| std::ptr::eq(*e, *edge)) {
                let _ = target_remaining.remove(position);
            }
            if target_remaining.is_empty() && !seen.contains(target) {
                reachable.push_back(target);
                let _ = seen.insert(target);
            }
        }
    }

    for name in flow.nodes.keys() {
        if !nodes.contains_key(&node_ids[name.as_str()]) {
            handler.on_error(
                &node_ids[name.as_str()],
                &format!("Flow node {name} is not reachable (this may indicate a cyclic dependency)"),
            );
        }
    }

    let inputs = nodes
        .values()
        .filter(|node| node.dependencies.is_empty())
        .map(|node| node.node_id.clone())
        .collect();
    let outputs = nodes
        .values()
        .filter(|node| node.outputs.is_empty())
        .map(|node| node.node_id.clone())
        .collect();

    GraphSection {
        nodes,
        inputs,
        outputs,
    }
}

/// Reports one error per target socket fed by more than one edge.
fn report_duplicate_feeds(
    node_ids: &IndexMap<&str, NodeId>,
    inbound: &HashMap<&str, Vec<&FlowEdge>>,
    handler: &mut dyn ErrorHandler,
) {
    for (target, edges) in inbound {
        let node_id = &node_ids[target];
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for edge in edges {
            *counts.entry(edge.target.socket.as_str()).or_insert(0) += 1;
        }
        for (socket, count) in counts {
            if count > 1 {
                handler.on_error(
                    node_id,
                    &format!(
                        "Target socket {} is supplied by multiple edges",
                        socket_display(node_id, socket)
                    ),
                );
            }
        }
    }
}

/// Builds one graph node from its flow node and inbound edges.
fn build_node(
    node_id: NodeId,
    flow: &FlowDefinition,
    flow_node: &FlowNode,
    inbound: &[&FlowEdge],
    node_ids: &IndexMap<&str, NodeId>,
    handler: &mut dyn ErrorHandler,
) -> Node<NodeMetadata> {
    let mut dependencies: IndexMap<String, SocketId> = IndexMap::new();
    let mut outputs: Vec<String> = Vec::new();
    let mut payload = NodeMetadata::new(flow_node.clone());

    let require_socket =
        |socket: &str, dependencies: &mut IndexMap<String, SocketId>, handler: &mut dyn ErrorHandler| {
            let supplied = inbound
                .iter()
                .find(|edge| edge.target.socket == socket);
            match supplied {
                Some(edge) => {
                    let source = SocketId::of(
                        node_ids[edge.source.node.as_str()].clone(),
                        edge.source.socket.clone(),
                    );
                    let _ = dependencies.insert(socket.to_owned(), source);
                }
                None => handler.on_error(
                    &node_id,
                    &format!(
                        "Socket {} is not supplied by any edge",
                        socket_display(&node_id, socket)
                    ),
                ),
            }
        };

    match flow_node.node_type {
        FlowNodeType::Input => {
            outputs.push(String::new());
            if let Some(declared) = flow.inputs.get(&node_id.name) {
                payload = payload.with_model_input_schema(declared.clone());
            }
        }
        FlowNodeType::Parameter => {
            outputs.push(String::new());
            if let Some(declared) = flow.parameters.get(&node_id.name) {
                payload = payload.with_model_parameter(declared.clone());
            }
        }
        FlowNodeType::Resource => {
            outputs.push(String::new());
            if let Some(declared) = flow.resources.get(&node_id.name) {
                payload = payload.with_model_resource(declared.clone());
            }
        }
        FlowNodeType::Output => {
            require_socket("", &mut dependencies, handler);
            if let Some(declared) = flow.outputs.get(&node_id.name) {
                payload = payload.with_model_output_schema(declared.clone());
            }
        }
        FlowNodeType::Model => {
            for socket in flow_node
                .parameters
                .iter()
                .chain(&flow_node.inputs)
                .chain(&flow_node.resources)
            {
                require_socket(socket.as_str(), &mut dependencies, handler);
            }
            outputs.extend(flow_node.outputs.iter().cloned());
        }
    }

    Node {
        node_id,
        dependencies,
        outputs,
        payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCollector;
    use strata_metadata::{FlowSocket, SINGLE_SOCKET};

    fn two_step_flow() -> FlowDefinition {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("raw".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow.nodes.insert(
            "enrich".to_owned(),
            FlowNode::model(Vec::<String>::new(), ["base"], ["enriched"]),
        );
        let _ = flow
            .nodes
            .insert("final".to_owned(), FlowNode::new(FlowNodeType::Output));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("raw"),
            FlowSocket::of("enrich", "base"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::of("enrich", "enriched"),
            FlowSocket::node("final"),
        ));
        flow
    }

    #[test]
    fn valid_flow_builds_every_node() {
        let flow = two_step_flow();
        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &NodeNamespace::root(), &mut errors);

        assert!(errors.is_empty(), "unexpected errors: {:?}", errors.errors());
        assert_eq!(section.nodes.len(), 3);
        assert_eq!(section.inputs.len(), 1);
        assert_eq!(section.outputs.len(), 1);
        assert_eq!(section.inputs[0].name, "raw");
        assert_eq!(section.outputs[0].name, "final");
    }

    #[test]
    fn nodes_expand_in_reachability_order() {
        let flow = two_step_flow();
        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &NodeNamespace::root(), &mut errors);

        let order: Vec<&str> = section.nodes.keys().map(|id| id.name.as_str()).collect();
        assert_eq!(order, ["raw", "enrich", "final"]);
    }

    #[test]
    fn model_dependencies_point_at_source_sockets() {
        let flow = two_step_flow();
        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &NodeNamespace::root(), &mut errors);

        let namespace = NodeNamespace::root();
        let enrich = &section.nodes[&NodeId::of("enrich", &namespace)];
        assert_eq!(
            enrich.dependencies["base"],
            SocketId::single(NodeId::of("raw", &namespace))
        );
        assert_eq!(enrich.outputs, ["enriched"]);
    }

    #[test]
    fn cycle_reports_unreachable_nodes() {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("a".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow.nodes.insert(
            "b".to_owned(),
            FlowNode::model(Vec::<String>::new(), ["x", "y"], ["out"]),
        );
        let _ = flow.nodes.insert(
            "c".to_owned(),
            FlowNode::model(Vec::<String>::new(), ["x"], ["out"]),
        );
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("a"),
            FlowSocket::of("b", "x"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::of("b", "out"),
            FlowSocket::of("c", "x"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::of("c", "out"),
            FlowSocket::of("b", "y"),
        ));

        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &NodeNamespace::root(), &mut errors);

        assert_eq!(section.nodes.len(), 1);
        let unreachable: Vec<String> = errors
            .errors()
            .iter()
            .filter_map(|error| match error {
                crate::error::GraphError::Semantic { node, detail }
                    if detail.contains("not reachable") =>
                {
                    Some(node.name.clone())
                }
                _ => None,
            })
            .collect();
        assert!(unreachable.contains(&"b".to_owned()) || unreachable.contains(&"c".to_owned()));
    }

    #[test]
    fn duplicate_feed_reports_once_per_socket() {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("a".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow
            .nodes
            .insert("b".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow
            .nodes
            .insert("out".to_owned(), FlowNode::new(FlowNodeType::Output));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("a"),
            FlowSocket::node("out"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("b"),
            FlowSocket::node("out"),
        ));

        let mut errors = ErrorCollector::new();
        let _ = build_flow(&flow, &NodeNamespace::root(), &mut errors);

        let duplicates = errors
            .errors()
            .iter()
            .filter(|error| error.to_string().contains("multiple edges"))
            .count();
        assert_eq!(duplicates, 1);
    }

    #[test]
    fn missing_socket_is_reported_with_display_name() {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("in".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow.nodes.insert(
            "m".to_owned(),
            FlowNode::model(Vec::<String>::new(), ["left", "right"], ["out"]),
        );
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("in"),
            FlowSocket::of("m", "left"),
        ));

        let mut errors = ErrorCollector::new();
        let _ = build_flow(&flow, &NodeNamespace::root(), &mut errors);

        assert!(
            errors
                .errors()
                .iter()
                .any(|error| error.to_string().contains("m.right"))
        );
    }

    #[test]
    fn unknown_edge_endpoint_is_reported() {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("in".to_owned(), FlowNode::new(FlowNodeType::Input));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("in"),
            FlowSocket::node("ghost"),
        ));

        let mut errors = ErrorCollector::new();
        let _ = build_flow(&flow, &NodeNamespace::root(), &mut errors);

        assert!(
            errors
                .errors()
                .iter()
                .any(|error| error.to_string().contains("unknown flow node ghost"))
        );
    }

    #[test]
    fn single_socket_duplicate_feed_uses_bare_node_name() {
        let _ = SINGLE_SOCKET; // the reserved socket is the empty string
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("a".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow
            .nodes
            .insert("out".to_owned(), FlowNode::new(FlowNodeType::Output));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("a"),
            FlowSocket::node("out"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("a"),
            FlowSocket::node("out"),
        ));

        let mut errors = ErrorCollector::new();
        let _ = build_flow(&flow, &NodeNamespace::root(), &mut errors);

        assert!(
            errors
                .errors()
                .iter()
                .any(|error| error.to_string().contains("Target socket out"))
        );
    }
}
