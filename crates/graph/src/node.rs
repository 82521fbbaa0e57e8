// SPDX-License-Identifier: Apache-2.0

//! Graph value types: namespaces, node identities, nodes and sections.
//!
//! Everything here is an immutable value. Transformation passes never
//! mutate a node in place; they build replacements and assemble a new
//! section, which gives structural sharing across successive passes.

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// A namespace for graph nodes; namespaces form a tree rooted at ROOT.
///
/// Nested namespaces keep nodes from different expansion scopes apart, e.g.
/// when a flow is expanded inside the scope of one job among several.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NodeNamespace {
    /// The root namespace.
    Root,
    /// A named namespace nested inside a parent.
    Nested {
        /// The namespace component name.
        name: String,
        /// The enclosing namespace.
        parent: Arc<NodeNamespace>,
    },
}

impl NodeNamespace {
    /// Returns the root namespace.
    #[must_use]
    pub fn root() -> Self {
        NodeNamespace::Root
    }

    /// Creates a namespace nested inside this one.
    #[must_use]
    pub fn nested(&self, name: impl Into<String>) -> Self {
        NodeNamespace::Nested {
            name: name.into(),
            parent: Arc::new(self.clone()),
        }
    }
}

impl fmt::Display for NodeNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeNamespace::Root => write!(f, "ROOT"),
            NodeNamespace::Nested { name, parent } => write!(f, "{name}.{parent}"),
        }
    }
}

/// Unique identity of a graph node: a name within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeId {
    /// The node name, unique within its namespace.
    pub name: String,
    /// The namespace the node lives in.
    pub namespace: NodeNamespace,
}

impl NodeId {
    /// Creates a node id in the given namespace.
    #[must_use]
    pub fn of(name: impl Into<String>, namespace: &NodeNamespace) -> Self {
        NodeId {
            name: name.into(),
            namespace: namespace.clone(),
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            NodeNamespace::Root => write!(f, "{}", self.name),
            namespace => write!(f, "{} ({namespace})", self.name),
        }
    }
}

/// A named socket on an identified node.
///
/// The reserved empty socket name denotes the single input or output of a
/// node that has exactly one; display rules collapse it to the bare node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SocketId {
    /// The node the socket belongs to.
    pub node: NodeId,
    /// The socket name; empty for the reserved single socket.
    pub socket: String,
}

impl SocketId {
    /// The reserved single-input / single-output socket of a node.
    #[must_use]
    pub fn single(node: NodeId) -> Self {
        SocketId {
            node,
            socket: String::new(),
        }
    }

    /// A named socket on a node.
    #[must_use]
    pub fn of(node: NodeId, socket: impl Into<String>) -> Self {
        SocketId {
            node,
            socket: socket.into(),
        }
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.socket.is_empty() {
            write!(f, "{}", self.node)
        } else {
            write!(f, "{}.{}", self.node.name, self.socket)
        }
    }
}

/// One node of an execution graph.
///
/// `dependencies` maps each of the node's input sockets to the upstream
/// socket feeding it; every target socket is fed by at most one edge by
/// construction. `outputs` lists the node's output socket names in
/// declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct Node<T> {
    /// The node's identity.
    pub node_id: NodeId,
    /// Input socket name to upstream source socket.
    pub dependencies: IndexMap<String, SocketId>,
    /// Output socket names, in declaration order.
    pub outputs: Vec<String>,
    /// The node payload.
    pub payload: T,
}

impl<T> Node<T> {
    /// Returns a copy of this node with a new payload.
    #[must_use]
    pub fn with_payload<U>(&self, payload: U) -> Node<U>
    where
        T: Clone,
    {
        Node {
            node_id: self.node_id.clone(),
            dependencies: self.dependencies.clone(),
            outputs: self.outputs.clone(),
            payload,
        }
    }
}

/// A section of an execution graph: nodes in topological order plus the
/// section's boundary.
///
/// `inputs` lists nodes with no dependencies and `outputs` nodes with no
/// output sockets, both in the order the builder reached them. Sections are
/// values: passes consume one and produce another.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSection<T> {
    /// All nodes, keyed by id, in topological (build) order.
    pub nodes: IndexMap<NodeId, Node<T>>,
    /// Nodes with no dependencies.
    pub inputs: Vec<NodeId>,
    /// Nodes with no output sockets.
    pub outputs: Vec<NodeId>,
}

impl<T> GraphSection<T> {
    /// An empty section.
    #[must_use]
    pub fn empty() -> Self {
        GraphSection {
            nodes: IndexMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

impl<T> Default for GraphSection<T> {
    fn default() -> Self {
        GraphSection::empty()
    }
}
