// SPDX-License-Identifier: Apache-2.0

//! Job definitions: requests to execute work against the platform.

use crate::object::TagSelector;
use crate::types::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A request to run a flow with concrete bindings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunFlowJob {
    /// Parameter values by parameter name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub parameters: IndexMap<String, Value>,

    /// Input dataset selectors by input name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub inputs: IndexMap<String, TagSelector>,

    /// Output dataset selectors by output name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, TagSelector>,

    /// Model selectors by model node name.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub models: IndexMap<String, TagSelector>,
}

/// A request to import a model from a code repository.
///
/// Present so callers can hand the graph core a job of the wrong type and
/// get a structured rejection; the core never plans imports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportModelJob {
    /// The repository holding the model code.
    pub repository: String,

    /// The path of the model entry point within the repository.
    pub path: String,
}

/// A job request, tagged by job type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "job_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobDefinition {
    /// Run a flow.
    RunFlow(RunFlowJob),
    /// Import a model (not planned by the graph core).
    ImportModel(ImportModelJob),
}

impl JobDefinition {
    /// Returns the run-flow payload if this is a run-flow job.
    #[must_use]
    pub fn as_run_flow(&self) -> Option<&RunFlowJob> {
        match self {
            JobDefinition::RunFlow(job) => Some(job),
            JobDefinition::ImportModel(_) => None,
        }
    }
}
