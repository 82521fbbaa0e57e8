// SPDX-License-Identifier: Apache-2.0

//! Type inference across graph edges.
//!
//! After binding, parameter / input / output / resource nodes that carry no
//! declared contract take one inferred from the models they connect to.
//! A node used by several models must satisfy all of them at once, so
//! multi-target uses combine under the rules in [`crate::combine`].
//! Conflicts are reported through the error handler and leave the node's
//! contract unset.

use crate::combine::{combine_input_schemas, combine_resources};
use crate::error::ErrorHandler;
use crate::metadata::NodeMetadata;
use crate::node::{GraphSection, Node, NodeId};
use indexmap::IndexMap;
use std::collections::HashMap;
use strata_metadata::{
    FlowNodeType, ModelDefinition, ModelInputSchema, ModelOutputSchema, ModelParameter,
    ResourceDefinition,
};

/// One use of an upstream node by a model: the model's id and the socket
/// name under which the model consumes the upstream node.
type ModelUse = (NodeId, String);

/// Infers missing contracts on a section's nodes, returning the augmented
/// section. Declared contracts always win; inference only fills gaps.
#[must_use]
pub fn infer_types(
    section: GraphSection<NodeMetadata>,
    handler: &mut dyn ErrorHandler,
) -> GraphSection<NodeMetadata> {
    let model_defs = collect_model_defs(&section);
    let uses = collect_model_uses(&section);

    let GraphSection {
        nodes,
        inputs,
        outputs,
    } = section;

    let mut inferred: IndexMap<NodeId, Node<NodeMetadata>> = IndexMap::with_capacity(nodes.len());
    for (node_id, node) in nodes {
        let node_uses = uses.get(&node_id).map(Vec::as_slice).unwrap_or(&[]);
        let payload = match node.payload.flow_node.node_type {
            FlowNodeType::Parameter if node.payload.model_parameter.is_none() => {
                match infer_parameter(&node_id, node_uses, &model_defs, handler) {
                    Some(parameter) => node.payload.clone().with_model_parameter(parameter),
                    None => node.payload.clone(),
                }
            }
            FlowNodeType::Input if node.payload.model_input_schema.is_none() => {
                match infer_input_schema(&node_id, node_uses, &model_defs, handler) {
                    Some(schema) => node.payload.clone().with_model_input_schema(schema),
                    None => node.payload.clone(),
                }
            }
            FlowNodeType::Output if node.payload.model_output_schema.is_none() => {
                match infer_output_schema(&node, &model_defs, &inferred) {
                    Some(schema) => node.payload.clone().with_model_output_schema(schema),
                    None => node.payload.clone(),
                }
            }
            FlowNodeType::Resource if node.payload.model_resource.is_none() => {
                match infer_resource(&node_id, node_uses, &model_defs, handler) {
                    Some(resource) => node.payload.clone().with_model_resource(resource),
                    None => node.payload.clone(),
                }
            }
            _ => node.payload.clone(),
        };
        let _ = inferred.insert(node_id, node.with_payload(payload));
    }

    GraphSection {
        nodes: inferred,
        inputs,
        outputs,
    }
}

fn collect_model_defs(section: &GraphSection<NodeMetadata>) -> HashMap<NodeId, ModelDefinition> {
    section
        .nodes
        .values()
        .filter_map(|node| {
            node.payload
                .runtime_object
                .as_ref()
                .and_then(|object| object.as_model())
                .map(|model| (node.node_id.clone(), model.clone()))
        })
        .collect()
}

fn collect_model_uses(section: &GraphSection<NodeMetadata>) -> HashMap<NodeId, Vec<ModelUse>> {
    let mut uses: HashMap<NodeId, Vec<ModelUse>> = HashMap::new();
    for node in section.nodes.values() {
        if node.payload.flow_node.node_type != FlowNodeType::Model {
            continue;
        }
        for (socket, dependency) in &node.dependencies {
            uses.entry(dependency.node.clone())
                .or_default()
                .push((node.node_id.clone(), socket.clone()));
        }
    }
    uses
}

fn infer_parameter(
    node_id: &NodeId,
    uses: &[ModelUse],
    model_defs: &HashMap<NodeId, ModelDefinition>,
    handler: &mut dyn ErrorHandler,
) -> Option<ModelParameter> {
    let declared: Vec<&ModelParameter> = uses
        .iter()
        .filter_map(|(model_id, socket)| {
            model_defs
                .get(model_id)
                .and_then(|model| model.parameters.get(socket))
        })
        .collect();

    let (first, rest) = declared.split_first()?;

    if rest.iter().any(|use_| use_.param_type != first.param_type) {
        handler.on_error(
            node_id,
            &format!(
                "Parameter {} is used with conflicting types",
                node_id.name
            ),
        );
        return None;
    }

    let mut combined = (*first).clone();
    if rest.iter().any(|use_| use_.default_value != first.default_value) {
        tracing::debug!(
            parameter = %node_id,
            "dropping default value that differs between parameter uses"
        );
        combined.default_value = None;
    }
    Some(combined)
}

fn infer_input_schema(
    node_id: &NodeId,
    uses: &[ModelUse],
    model_defs: &HashMap<NodeId, ModelDefinition>,
    handler: &mut dyn ErrorHandler,
) -> Option<ModelInputSchema> {
    let declared: Vec<&ModelInputSchema> = uses
        .iter()
        .filter_map(|(model_id, socket)| {
            model_defs
                .get(model_id)
                .and_then(|model| model.inputs.get(socket))
        })
        .collect();

    let (first, rest) = declared.split_first()?;

    let mut combined = (*first).clone();
    for next in rest {
        match combine_input_schemas(&combined, next) {
            Ok(merged) => combined = merged,
            Err(conflict) => {
                handler.on_error(node_id, &conflict.to_string());
                return None;
            }
        }
    }
    Some(combined)
}

fn infer_output_schema(
    node: &Node<NodeMetadata>,
    model_defs: &HashMap<NodeId, ModelDefinition>,
    inferred: &IndexMap<NodeId, Node<NodeMetadata>>,
) -> Option<ModelOutputSchema> {
    // Outputs fed by anything other than exactly one edge are skipped.
    if node.dependencies.len() != 1 {
        return None;
    }
    let source = node.dependencies.values().next()?;

    if let Some(model) = model_defs.get(&source.node) {
        return model.outputs.get(&source.socket).cloned();
    }

    // Passthrough: a source that carries an input schema mirrors it.
    let source_node = inferred.get(&source.node)?;
    source_node
        .payload
        .model_input_schema
        .as_ref()
        .map(|input| ModelOutputSchema {
            schema: input.schema.clone(),
            label: input.label.clone(),
            optional: input.optional,
            dynamic: input.dynamic,
        })
}

fn infer_resource(
    node_id: &NodeId,
    uses: &[ModelUse],
    model_defs: &HashMap<NodeId, ModelDefinition>,
    handler: &mut dyn ErrorHandler,
) -> Option<ResourceDefinition> {
    let declared: Vec<&ResourceDefinition> = uses
        .iter()
        .filter_map(|(model_id, socket)| {
            model_defs
                .get(model_id)
                .and_then(|model| model.resources.get(socket))
        })
        .collect();

    let (first, rest) = declared.split_first()?;

    let mut combined = (*first).clone();
    for next in rest {
        match combine_resources(&combined, next) {
            Ok(merged) => combined = merged,
            Err(conflict) => {
                handler.on_error(node_id, &conflict.to_string());
                return None;
            }
        }
    }
    Some(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::bind_job;
    use crate::builder::build_flow;
    use crate::error::ErrorCollector;
    use crate::node::NodeNamespace;
    use strata_metadata::{
        BasicType, FieldSchema, FlowDefinition, FlowEdge, FlowNode, FlowSocket, MetadataBundle,
        ObjectDefinition, ObjectType, ResourceBundle, RunFlowJob, SchemaDefinition, TableSchema,
        TagSelector, TypeDescriptor, Value,
    };

    fn price_input(field_name: &str, not_null: bool) -> ModelInputSchema {
        ModelInputSchema::of(SchemaDefinition::Table(TableSchema::of(vec![
            FieldSchema::new(field_name, 0, BasicType::Float).with_not_null(not_null),
        ])))
    }

    /// One input feeding two models, each declaring the same input socket.
    fn shared_input_section(
        m1: ModelDefinition,
        m2: ModelDefinition,
    ) -> (GraphSection<NodeMetadata>, NodeNamespace, ErrorCollector) {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("x".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow.nodes.insert(
            "m1".to_owned(),
            FlowNode::model(Vec::<String>::new(), ["x"], ["out"]),
        );
        let _ = flow.nodes.insert(
            "m2".to_owned(),
            FlowNode::model(Vec::<String>::new(), ["x"], ["out"]),
        );
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("x"),
            FlowSocket::of("m1", "x"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("x"),
            FlowSocket::of("m2", "x"),
        ));

        let namespace = NodeNamespace::root();
        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &namespace, &mut errors);

        let mut job = RunFlowJob::default();
        let _ = job
            .models
            .insert("m1".to_owned(), TagSelector::latest(ObjectType::Model, "m1"));
        let _ = job
            .models
            .insert("m2".to_owned(), TagSelector::latest(ObjectType::Model, "m2"));

        let mut metadata = MetadataBundle::new();
        metadata.add_object("m1", ObjectDefinition::Model(m1));
        metadata.add_object("m2", ObjectDefinition::Model(m2));

        let bound = bind_job(section, &job, &metadata, &ResourceBundle::new());
        (bound, namespace, errors)
    }

    #[test]
    fn shared_input_combines_schemas_across_targets() {
        let mut m1 = ModelDefinition::default();
        let _ = m1.inputs.insert("x".to_owned(), price_input("Price", false));
        let mut m2 = ModelDefinition::default();
        let _ = m2.inputs.insert("x".to_owned(), price_input("price", true));

        let (section, namespace, mut errors) = shared_input_section(m1, m2);
        let section = infer_types(section, &mut errors);
        assert!(errors.is_empty(), "unexpected errors: {:?}", errors.errors());

        let input = &section.nodes[&NodeId::of("x", &namespace)];
        let schema = input
            .payload
            .model_input_schema
            .as_ref()
            .and_then(|input| input.schema.as_ref())
            .expect("inferred schema");
        let fields = &schema.table().fields;
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field_name, "Price");
        assert_eq!(fields[0].field_type, BasicType::Float);
        assert!(fields[0].not_null);
    }

    #[test]
    fn parameter_type_conflict_reports_and_leaves_unset() {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("p".to_owned(), FlowNode::new(FlowNodeType::Parameter));
        let _ = flow.nodes.insert(
            "m1".to_owned(),
            FlowNode::model(["p"], Vec::<String>::new(), ["out"]),
        );
        let _ = flow.nodes.insert(
            "m2".to_owned(),
            FlowNode::model(["p"], Vec::<String>::new(), ["out"]),
        );
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("p"),
            FlowSocket::of("m1", "p"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("p"),
            FlowSocket::of("m2", "p"),
        ));

        let namespace = NodeNamespace::root();
        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &namespace, &mut errors);

        let mut m1 = ModelDefinition::default();
        let _ = m1.parameters.insert(
            "p".to_owned(),
            ModelParameter::new(TypeDescriptor::new(BasicType::Integer)),
        );
        let mut m2 = ModelDefinition::default();
        let _ = m2.parameters.insert(
            "p".to_owned(),
            ModelParameter::new(TypeDescriptor::new(BasicType::String)),
        );

        let mut job = RunFlowJob::default();
        let _ = job
            .models
            .insert("m1".to_owned(), TagSelector::latest(ObjectType::Model, "m1"));
        let _ = job
            .models
            .insert("m2".to_owned(), TagSelector::latest(ObjectType::Model, "m2"));
        let mut metadata = MetadataBundle::new();
        metadata.add_object("m1", ObjectDefinition::Model(m1));
        metadata.add_object("m2", ObjectDefinition::Model(m2));

        let bound = bind_job(section, &job, &metadata, &ResourceBundle::new());
        let section = infer_types(bound, &mut errors);

        assert!(
            errors
                .errors()
                .iter()
                .any(|error| error.to_string().contains("conflicting types"))
        );
        let parameter = &section.nodes[&NodeId::of("p", &namespace)];
        assert!(parameter.payload.model_parameter.is_none());
    }

    #[test]
    fn diverging_defaults_are_dropped() {
        let mut m1 = ModelDefinition::default();
        let _ = m1.parameters.insert(
            "x".to_owned(),
            ModelParameter::new(TypeDescriptor::new(BasicType::Float))
                .with_default(Value::Float(1.0)),
        );
        let mut m2 = ModelDefinition::default();
        let _ = m2.parameters.insert(
            "x".to_owned(),
            ModelParameter::new(TypeDescriptor::new(BasicType::Float))
                .with_default(Value::Float(2.0)),
        );

        // Reuse the shared-input wiring, but as parameter connections.
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("x".to_owned(), FlowNode::new(FlowNodeType::Parameter));
        let _ = flow.nodes.insert(
            "m1".to_owned(),
            FlowNode::model(["x"], Vec::<String>::new(), ["out"]),
        );
        let _ = flow.nodes.insert(
            "m2".to_owned(),
            FlowNode::model(["x"], Vec::<String>::new(), ["out"]),
        );
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("x"),
            FlowSocket::of("m1", "x"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("x"),
            FlowSocket::of("m2", "x"),
        ));

        let namespace = NodeNamespace::root();
        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &namespace, &mut errors);

        let mut job = RunFlowJob::default();
        let _ = job
            .models
            .insert("m1".to_owned(), TagSelector::latest(ObjectType::Model, "m1"));
        let _ = job
            .models
            .insert("m2".to_owned(), TagSelector::latest(ObjectType::Model, "m2"));
        let mut metadata = MetadataBundle::new();
        metadata.add_object("m1", ObjectDefinition::Model(m1));
        metadata.add_object("m2", ObjectDefinition::Model(m2));

        let bound = bind_job(section, &job, &metadata, &ResourceBundle::new());
        let section = infer_types(bound, &mut errors);
        assert!(errors.is_empty());

        let parameter = &section.nodes[&NodeId::of("x", &namespace)];
        let inferred = parameter
            .payload
            .model_parameter
            .as_ref()
            .expect("parameter inferred");
        assert_eq!(inferred.param_type.basic_type, BasicType::Float);
        assert!(inferred.default_value.is_none());
    }

    #[test]
    fn output_takes_unique_source_model_declaration() {
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("in".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow.nodes.insert(
            "m".to_owned(),
            FlowNode::model(Vec::<String>::new(), ["in"], ["result"]),
        );
        let _ = flow
            .nodes
            .insert("out".to_owned(), FlowNode::new(FlowNodeType::Output));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("in"),
            FlowSocket::of("m", "in"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::of("m", "result"),
            FlowSocket::node("out"),
        ));

        let namespace = NodeNamespace::root();
        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &namespace, &mut errors);

        let mut model = ModelDefinition::default();
        let _ = model.inputs.insert("in".to_owned(), price_input("Price", true));
        let _ = model.outputs.insert(
            "result".to_owned(),
            ModelOutputSchema::of(SchemaDefinition::Table(TableSchema::of(vec![
                FieldSchema::new("pnl", 0, BasicType::Float),
            ]))),
        );

        let mut job = RunFlowJob::default();
        let _ = job
            .models
            .insert("m".to_owned(), TagSelector::latest(ObjectType::Model, "m"));
        let mut metadata = MetadataBundle::new();
        metadata.add_object("m", ObjectDefinition::Model(model));

        let bound = bind_job(section, &job, &metadata, &ResourceBundle::new());
        let section = infer_types(bound, &mut errors);
        assert!(errors.is_empty());

        let output = &section.nodes[&NodeId::of("out", &namespace)];
        let schema = output
            .payload
            .model_output_schema
            .as_ref()
            .and_then(|output| output.schema.as_ref())
            .expect("inferred output schema");
        assert_eq!(schema.table().fields[0].field_name, "pnl");
    }

    #[test]
    fn passthrough_output_mirrors_input_schema() {
        // input wired straight to an output; the input schema is inferred
        // from a model target first, then mirrored onto the output.
        let mut flow = FlowDefinition::default();
        let _ = flow
            .nodes
            .insert("in".to_owned(), FlowNode::new(FlowNodeType::Input));
        let _ = flow.nodes.insert(
            "m".to_owned(),
            FlowNode::model(Vec::<String>::new(), ["in"], ["out"]),
        );
        let _ = flow
            .nodes
            .insert("copy".to_owned(), FlowNode::new(FlowNodeType::Output));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("in"),
            FlowSocket::of("m", "in"),
        ));
        flow.edges.push(FlowEdge::new(
            FlowSocket::node("in"),
            FlowSocket::node("copy"),
        ));

        let namespace = NodeNamespace::root();
        let mut errors = ErrorCollector::new();
        let section = build_flow(&flow, &namespace, &mut errors);

        let mut model = ModelDefinition::default();
        let _ = model.inputs.insert("in".to_owned(), price_input("Price", true));

        let mut job = RunFlowJob::default();
        let _ = job
            .models
            .insert("m".to_owned(), TagSelector::latest(ObjectType::Model, "m"));
        let mut metadata = MetadataBundle::new();
        metadata.add_object("m", ObjectDefinition::Model(model));

        let bound = bind_job(section, &job, &metadata, &ResourceBundle::new());
        let section = infer_types(bound, &mut errors);
        assert!(errors.is_empty());

        let output = &section.nodes[&NodeId::of("copy", &namespace)];
        let schema = output
            .payload
            .model_output_schema
            .as_ref()
            .and_then(|output| output.schema.as_ref())
            .expect("mirrored schema");
        assert_eq!(schema.table().fields[0].field_name, "Price");
    }
}
