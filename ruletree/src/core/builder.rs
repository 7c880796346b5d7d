//! Compiles [`RuleSpec`]s into trees of [`MapperNode`]s.
//!
//! Building happens once per configuration: expressions are compiled, names
//! are resolved against the registry and every malformed rule is reported
//! before a single document is processed.

use std::sync::Arc;

use tracing::debug;

use crate::core::collection::CollectionLayout;
use crate::core::error::RuleError;
use crate::core::node::{LeafNode, MapperNode, RoutingNode};
use crate::core::predicate::{Evaluator, PredicateBuilder, Variables};
use crate::core::registry::Registry;
use crate::core::spec::{NodeKind, RuleFields, RuleSpec};
use crate::core::transform::{resolve_optional, resolve_transform};

/// Result of building a spec: one node, or an ordered flat list of nodes.
#[derive(Debug, Clone)]
pub enum Built {
    Node(MapperNode),
    List(Vec<MapperNode>),
}

impl Built {
    pub fn into_nodes(self) -> Vec<MapperNode> {
        match self {
            Self::Node(node) => vec![node],
            Self::List(nodes) => nodes,
        }
    }

    pub fn into_node(self) -> Option<MapperNode> {
        match self {
            Self::Node(node) => Some(node),
            Self::List(_) => None,
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            Self::Node(node) => node.node_count(),
            Self::List(nodes) => nodes.iter().map(MapperNode::node_count).sum(),
        }
    }
}

pub struct RuleBuilder<'a> {
    evaluator: &'a dyn Evaluator,
    registry: &'a Registry,
    variables: Variables,
    layout: Arc<CollectionLayout>,
}

impl<'a> RuleBuilder<'a> {
    pub fn new(evaluator: &'a dyn Evaluator, registry: &'a Registry) -> Self {
        Self {
            evaluator,
            registry,
            variables: Variables::new(),
            layout: Arc::new(CollectionLayout::default()),
        }
    }

    /// Variables bound into every compiled expression.
    pub fn with_variables(mut self, variables: Variables) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_layout(mut self, layout: CollectionLayout) -> Self {
        self.layout = Arc::new(layout);
        self
    }

    pub fn build(&self, spec: &RuleSpec) -> Result<Built, RuleError> {
        let built = self.build_at(spec, "$")?;
        debug!(nodes = built.node_count(), "built rule tree");
        Ok(built)
    }

    /// Build a spec that must describe exactly one node.
    pub fn build_root(&self, spec: &RuleSpec) -> Result<MapperNode, RuleError> {
        self.build(spec)?.into_node().ok_or_else(|| {
            RuleError::configuration("$", "root must be a single rule with `mappers` or `exec`")
        })
    }

    fn build_at(&self, spec: &RuleSpec, at: &str) -> Result<Built, RuleError> {
        match spec {
            RuleSpec::Absent => Ok(Built::List(Vec::new())),
            RuleSpec::List(items) => {
                let mut nodes = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    nodes.extend(self.build_at(item, &format!("{at}[{index}]"))?.into_nodes());
                }
                Ok(Built::List(nodes))
            }
            RuleSpec::Rule(fields) => self.build_rule(fields, at).map(Built::Node),
            RuleSpec::Named(entries) => {
                let mut nodes = Vec::with_capacity(entries.len());
                for (name, entry) in entries {
                    let entry_at = format!("{at}.{name}");
                    let built = match entry {
                        RuleSpec::Rule(fields) => {
                            let mut fields = fields.clone();
                            fields.inject_name(name);
                            Built::Node(self.build_rule(&fields, &entry_at)?)
                        }
                        other => self.build_at(other, &entry_at)?,
                    };
                    nodes.extend(built.into_nodes());
                }
                Ok(Built::List(nodes))
            }
        }
    }

    fn build_rule(&self, fields: &RuleFields, at: &str) -> Result<MapperNode, RuleError> {
        match fields.kind() {
            Some(NodeKind::Routing) => self.build_routing(fields, at).map(MapperNode::Routing),
            Some(NodeKind::Leaf) => self.build_leaf(fields, at).map(MapperNode::Leaf),
            None => Err(RuleError::configuration(
                at,
                "rule has neither `mappers` nor `exec`",
            )),
        }
    }

    fn build_routing(&self, fields: &RuleFields, at: &str) -> Result<RoutingNode, RuleError> {
        let predicates = PredicateBuilder::new(self.evaluator, self.registry, &self.variables);
        let children = match &fields.mappers {
            Some(mappers) => self.build_at(mappers, &format!("{at}.mappers"))?.into_nodes(),
            None => Vec::new(),
        };
        Ok(RoutingNode {
            description: fields.description.clone(),
            filter: predicates.build_optional(fields.filter.as_ref(), &format!("{at}.filter"))?,
            ignore: predicates.build_optional(fields.ignore.as_ref(), &format!("{at}.ignore"))?,
            exclude: predicates
                .build_optional(fields.exclude.as_ref(), &format!("{at}.exclude"))?,
            default: resolve_optional(
                fields.default.as_ref(),
                self.registry,
                &format!("{at}.default"),
            )?,
            children,
            layout: Arc::clone(&self.layout),
        })
    }

    fn build_leaf(&self, fields: &RuleFields, at: &str) -> Result<LeafNode, RuleError> {
        let predicates = PredicateBuilder::new(self.evaluator, self.registry, &self.variables);
        let exec = fields
            .exec
            .as_ref()
            .ok_or_else(|| RuleError::configuration(at, "leaf rule has no `exec`"))?;
        Ok(LeafNode {
            description: fields.description.clone(),
            filter: predicates.build_optional(fields.filter.as_ref(), &format!("{at}.filter"))?,
            transform: resolve_transform(exec, self.registry, &format!("{at}.exec"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::PathEvaluator;
    use crate::core::spec::PredicateSpec;
    use crate::test_support::{mark, registry_with_marks};
    use serde_json::{Value, json};

    fn build(spec: &RuleSpec) -> Result<Built, RuleError> {
        let evaluator = PathEvaluator::default();
        let registry = registry_with_marks();
        RuleBuilder::new(&evaluator, &registry).build(spec)
    }

    #[test]
    fn absent_builds_empty_list() {
        let built = build(&RuleSpec::Absent).expect("build");
        assert!(matches!(built, Built::List(ref nodes) if nodes.is_empty()));
    }

    #[test]
    fn mappers_and_exec_builds_routing_node() {
        let spec = RuleSpec::from(RuleFields::routing(RuleSpec::Absent).exec("mark_a"));
        let node = build(&spec).expect("build").into_node().expect("single node");
        assert!(matches!(node, MapperNode::Routing(_)));
    }

    #[test]
    fn exec_builds_leaf_node() {
        let spec = RuleSpec::from(RuleFields::leaf(mark("x")).filter("Patient"));
        let node = build(&spec).expect("build").into_node().expect("single node");
        assert!(matches!(node, MapperNode::Leaf(_)));
    }

    #[test]
    fn nested_lists_flatten_in_order() {
        let spec = RuleSpec::List(vec![
            RuleFields::leaf("mark_a").description("first").into(),
            RuleSpec::List(vec![
                RuleFields::leaf("mark_b").description("second").into(),
                RuleSpec::Absent,
                RuleFields::leaf("mark_a").description("third").into(),
            ]),
        ]);
        let nodes = build(&spec).expect("build").into_nodes();
        let labels: Vec<_> = nodes.iter().map(MapperNode::description).collect();
        assert_eq!(labels, vec![Some("first"), Some("second"), Some("third")]);
    }

    #[test]
    fn named_mapping_injects_filter_and_description() {
        let spec = RuleSpec::from_value(&json!({
            "Patient": {"exec": "mark_a"},
            "Condition": {"exec": "mark_b", "filter": "Observation", "description": "kept"}
        }))
        .expect("classify");
        let nodes = build(&spec).expect("build").into_nodes();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].description(), Some("Patient"));
        assert_eq!(nodes[1].description(), Some("kept"));

        let patient = json!({"resourceType": "Patient"});
        let condition = json!({"resourceType": "Condition"});
        let observation = json!({"resourceType": "Observation"});
        assert!(nodes[0].filter(&patient, &Value::Null).expect("filter"));
        assert!(!nodes[0].filter(&condition, &Value::Null).expect("filter"));
        assert!(nodes[1].filter(&observation, &Value::Null).expect("filter"));
        assert!(!nodes[1].filter(&condition, &Value::Null).expect("filter"));
    }

    #[test]
    fn routing_children_come_from_name_mapping() {
        let spec = RuleSpec::from_value(&json!({
            "filter": {"fn": "always"},
            "mappers": {
                "Patient": {"exec": "mark_a"},
                "Condition": {"mappers": [{"filter": "Condition", "exec": "mark_b"}]}
            }
        }))
        .expect("classify");
        let node = build(&spec).expect("build").into_node().expect("single node");
        let MapperNode::Routing(routing) = &node else {
            panic!("expected routing node");
        };
        assert_eq!(routing.children().len(), 2);
        assert!(matches!(routing.children()[1], MapperNode::Routing(_)));
        assert_eq!(node.node_count(), 4);
    }

    #[test]
    fn rule_without_kind_is_rejected() {
        let spec = RuleSpec::from(RuleFields::default().filter("Patient"));
        let err = build(&spec).expect_err("should fail");
        assert!(err.is_build_error());
        assert!(err.to_string().contains("neither `mappers` nor `exec`"));
    }

    #[test]
    fn unknown_names_fail_with_location() {
        let spec = RuleSpec::from_value(&json!({
            "filter": "Patient",
            "mappers": [{"filter": "Patient", "exec": "missing"}]
        }))
        .expect("classify");
        let err = build(&spec).expect_err("should fail");
        assert!(err.to_string().contains("$.mappers[0].exec"), "{err}");

        let spec = RuleSpec::from(
            RuleFields::routing(RuleSpec::Absent).default_transform("missing"),
        );
        let err = build(&spec).expect_err("should fail");
        assert!(err.to_string().contains("$.default"), "{err}");
    }

    #[test]
    fn bad_expression_fails_before_execution() {
        let spec = RuleSpec::from(
            RuleFields::routing(RuleSpec::Absent).ignore(PredicateSpec::from("Patient.(")),
        );
        let err = build(&spec).expect_err("should fail");
        assert!(matches!(err, RuleError::Expression { ref at, .. } if at == "$.ignore"));
    }

    #[test]
    fn build_root_requires_single_node() {
        let evaluator = PathEvaluator::default();
        let registry = registry_with_marks();
        let builder = RuleBuilder::new(&evaluator, &registry);
        let err = builder
            .build_root(&RuleSpec::List(Vec::new()))
            .expect_err("should fail");
        assert!(err.to_string().contains("root must be a single rule"));
    }

    #[test]
    fn variables_reach_expressions() {
        let evaluator = PathEvaluator::default();
        let registry = registry_with_marks();
        let mut variables = Variables::new();
        variables.insert("codes".to_string(), json!(["c1"]));
        let node = RuleBuilder::new(&evaluator, &registry)
            .with_variables(variables)
            .build_root(&RuleFields::leaf("mark_a").filter("code in %codes").into())
            .expect("build");
        assert!(node.filter(&json!({"code": "c1"}), &Value::Null).expect("filter"));
        assert!(!node.filter(&json!({"code": "c2"}), &Value::Null).expect("filter"));
    }
}
