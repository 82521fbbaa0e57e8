// SPDX-License-Identifier: Apache-2.0

//! One-call compilation of a run-flow job.

use crate::autowire::autowire_parameters;
use crate::binder::bind_job;
use crate::builder::build_flow;
use crate::error::{ErrorHandler, GraphError};
use crate::infer::infer_types;
use crate::metadata::NodeMetadata;
use crate::node::{GraphSection, NodeNamespace};
use strata_metadata::{FlowDefinition, JobDefinition, MetadataBundle, ResourceBundle};

/// Compiles a run-flow job into a fully resolved graph section.
///
/// Chains the four passes: build, bind, auto-wire, infer. Semantic defects
/// go through `handler` as in each individual pass; a job of the wrong type
/// is rejected outright, since no pass can interpret it.
///
/// # Errors
///
/// Returns [`GraphError::Internal`] if `job` is not a run-flow job.
pub fn build_run_flow_graph(
    job: &JobDefinition,
    flow: &FlowDefinition,
    namespace: &NodeNamespace,
    metadata: &MetadataBundle,
    resources: &ResourceBundle,
    handler: &mut dyn ErrorHandler,
) -> Result<GraphSection<NodeMetadata>, GraphError> {
    let Some(run_flow) = job.as_run_flow() else {
        return Err(GraphError::Internal {
            message: "Graph compilation requires a run-flow job".to_owned(),
        });
    };

    let section = build_flow(flow, namespace, handler);
    let section = bind_job(section, run_flow, metadata, resources);
    let section = autowire_parameters(section, flow, run_flow, namespace, handler);
    Ok(infer_types(section, handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCollector;
    use strata_metadata::{ImportModelJob, RunFlowJob};

    #[test]
    fn wrong_job_type_is_rejected() {
        let job = JobDefinition::ImportModel(ImportModelJob {
            repository: "models".to_owned(),
            path: "pnl/model.py".to_owned(),
        });
        let mut errors = ErrorCollector::new();
        let result = build_run_flow_graph(
            &job,
            &FlowDefinition::default(),
            &NodeNamespace::root(),
            &MetadataBundle::new(),
            &ResourceBundle::new(),
            &mut errors,
        );
        assert!(matches!(result, Err(GraphError::Internal { .. })));
    }

    #[test]
    fn empty_flow_compiles_to_empty_section() {
        let job = JobDefinition::RunFlow(RunFlowJob::default());
        let mut errors = ErrorCollector::new();
        let section = build_run_flow_graph(
            &job,
            &FlowDefinition::default(),
            &NodeNamespace::root(),
            &MetadataBundle::new(),
            &ResourceBundle::new(),
            &mut errors,
        )
        .expect("run-flow job");
        assert!(section.nodes.is_empty());
        assert!(errors.is_empty());
    }
}
