// Copyright The Strata Dataflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Flow graph core.
//!
//! Compiles a declarative flow definition plus a job request into a fully
//! resolved, typed, topologically ordered execution graph. The compilation
//! runs as a sequence of pure passes over immutable graph values:
//!
//! 1. [`builder::build_flow`] — topological expansion of the flow into a
//!    node/edge graph (Kahn's algorithm), with structural validation.
//! 2. [`binder::bind_job`] — attaches runtime values and object references
//!    from the job request.
//! 3. [`autowire::autowire_parameters`] — synthesizes parameter nodes
//!    required by referenced models but not pre-declared.
//! 4. [`infer::infer_types`] — propagates parameter types and input/output
//!    schemas across connected edges.
//!
//! [`export::export_flow`] reverses the expansion, reconstructing a flow
//! definition from a graph section. [`jobs::build_run_flow_graph`] chains
//! the four passes for a run-flow job.
//!
//! Semantic defects never panic and never abort the build: they are
//! reported through an [`error::ErrorHandler`] and compilation continues
//! where possible, so a single build surfaces every problem at once.

pub mod autowire;
pub mod binder;
pub mod builder;
pub mod combine;
pub mod error;
pub mod export;
pub mod infer;
pub mod jobs;
pub mod metadata;
pub mod node;

pub use error::{ErrorCollector, ErrorHandler, GraphError};
pub use jobs::build_run_flow_graph;
pub use metadata::NodeMetadata;
pub use node::{GraphSection, Node, NodeId, NodeNamespace, SocketId};
