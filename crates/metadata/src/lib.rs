// Copyright The Strata Dataflow Authors
// SPDX-License-Identifier: Apache-2.0

//! Shared value types for the Strata dataflow core.
//!
//! This crate defines the platform's metadata model: the primitive type
//! system and runtime values, tabular schemas, model/flow/resource/job
//! definitions, and the read-only bundles used to resolve object references
//! at graph-build time. Everything here is a plain value with serde
//! round-trip support; no IO and no persistence.

pub mod bundle;
pub mod error;
pub mod flow;
pub mod job;
pub mod model;
pub mod object;
pub mod resource;
pub mod schema;
pub mod types;

pub use bundle::{MetadataBundle, ResourceBundle};
pub use error::Error;
pub use flow::{FlowDefinition, FlowEdge, FlowNode, FlowNodeType, FlowSocket, SINGLE_SOCKET};
pub use job::{ImportModelJob, JobDefinition, RunFlowJob};
pub use model::{ModelDefinition, ModelInputSchema, ModelOutputSchema, ModelParameter};
pub use object::{DataDefinition, ObjectDefinition, ObjectType, TagSelector};
pub use resource::{ResourceDefinition, ResourceType};
pub use schema::{FieldSchema, SchemaDefinition, TableSchema};
pub use types::{BasicType, TypeDescriptor, Value};
