// SPDX-License-Identifier: Apache-2.0

//! Errors and error reporting for the graph core.
//!
//! Semantic defects in a flow (cycles, missing sockets, conflicting types)
//! are reported through an [`ErrorHandler`] so one build pass can surface
//! every problem; only malformed inputs that make compilation meaningless
//! (e.g. a job of the wrong type) are returned as hard errors.

use crate::node::NodeId;

/// Errors raised by the graph core.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// A semantic defect in the flow, attributed to one node.
    #[error("Invalid flow: {detail} (node {node})")]
    Semantic {
        /// The node the defect is attributed to.
        node: NodeId,
        /// Human-readable description of the defect.
        detail: String,
    },

    /// An invariant violation: the input is malformed beyond reporting.
    #[error("Internal graph error: {message}")]
    Internal {
        /// Description of the violated invariant.
        message: String,
    },
}

/// Receives semantic defects during graph compilation.
///
/// Implemented for any `FnMut(&NodeId, &str)` closure; use
/// [`ErrorCollector`] to accumulate structured errors instead.
pub trait ErrorHandler {
    /// Reports one defect attributed to one node.
    fn on_error(&mut self, node: &NodeId, detail: &str);
}

impl<F> ErrorHandler for F
where
    F: FnMut(&NodeId, &str),
{
    fn on_error(&mut self, node: &NodeId, detail: &str) {
        self(node, detail)
    }
}

/// An [`ErrorHandler`] that accumulates structured [`GraphError`] values.
#[derive(Debug, Default)]
pub struct ErrorCollector {
    errors: Vec<GraphError>,
}

impl ErrorCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        ErrorCollector { errors: Vec::new() }
    }

    /// The errors collected so far.
    #[must_use]
    pub fn errors(&self) -> &[GraphError] {
        &self.errors
    }

    /// True if no errors were collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Consumes the collector, returning the collected errors.
    #[must_use]
    pub fn into_errors(self) -> Vec<GraphError> {
        self.errors
    }
}

impl ErrorHandler for ErrorCollector {
    fn on_error(&mut self, node: &NodeId, detail: &str) {
        self.errors.push(GraphError::Semantic {
            node: node.clone(),
            detail: detail.to_owned(),
        });
    }
}

/// A conflict found while combining two schemas.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("Schema conflict: {detail}")]
pub struct SchemaConflict {
    /// Human-readable description of the conflict.
    pub detail: String,
}

impl SchemaConflict {
    pub(crate) fn new(detail: impl Into<String>) -> Self {
        SchemaConflict {
            detail: detail.into(),
        }
    }
}
