//! Declarative rule specs and their classification from JSON.
//!
//! A [`RuleSpec`] is what an author writes. Its shape is decided once, either
//! by constructing the enum directly or by [`RuleSpec::from_value`]; the
//! builder never looks at raw keys again.

use std::fmt;

use serde_json::{Map, Value};

use crate::core::error::RuleError;
use crate::core::predicate::Predicate;
use crate::core::transform::Transform;

/// Keys a rule object may carry. Anything else is ignored.
pub const RULE_KEYS: [&str; 7] = [
    "filter",
    "ignore",
    "exclude",
    "default",
    "mappers",
    "exec",
    "description",
];

/// How a test over a document is written.
#[derive(Clone)]
pub enum PredicateSpec {
    /// Compiled through the expression evaluator.
    Expression(String),
    /// Used as-is; its result is still normalized by the caller.
    Function(Predicate),
    /// Looked up in the predicate registry.
    Named(String),
    /// Matches when any member matches, checked in order.
    AnyOf(Vec<PredicateSpec>),
}

/// How a rewrite of a document is written.
#[derive(Clone)]
pub enum TransformSpec {
    /// Looked up in the transform registry.
    Named(String),
    Function(Transform),
}

/// Which node a rule compiles into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Routing,
    Leaf,
}

/// Fields of a single rule object.
#[derive(Clone, Default)]
pub struct RuleFields {
    pub filter: Option<PredicateSpec>,
    pub ignore: Option<PredicateSpec>,
    pub exclude: Option<PredicateSpec>,
    pub default: Option<TransformSpec>,
    pub mappers: Option<Box<RuleSpec>>,
    pub exec: Option<TransformSpec>,
    pub description: Option<String>,
}

/// Author-supplied description of one node or a group of nodes.
#[derive(Clone, Default)]
pub enum RuleSpec {
    #[default]
    Absent,
    List(Vec<RuleSpec>),
    Rule(RuleFields),
    /// Name to spec mapping; names double as implicit filter and description.
    Named(Vec<(String, RuleSpec)>),
}

impl RuleFields {
    /// Start a routing rule over `mappers`.
    pub fn routing(mappers: impl Into<RuleSpec>) -> Self {
        Self {
            mappers: Some(Box::new(mappers.into())),
            ..Self::default()
        }
    }

    /// Start a leaf rule applying `exec`.
    pub fn leaf(exec: impl Into<TransformSpec>) -> Self {
        Self {
            exec: Some(exec.into()),
            ..Self::default()
        }
    }

    pub fn filter(mut self, spec: impl Into<PredicateSpec>) -> Self {
        self.filter = Some(spec.into());
        self
    }

    pub fn ignore(mut self, spec: impl Into<PredicateSpec>) -> Self {
        self.ignore = Some(spec.into());
        self
    }

    pub fn exclude(mut self, spec: impl Into<PredicateSpec>) -> Self {
        self.exclude = Some(spec.into());
        self
    }

    pub fn default_transform(mut self, spec: impl Into<TransformSpec>) -> Self {
        self.default = Some(spec.into());
        self
    }

    pub fn exec(mut self, spec: impl Into<TransformSpec>) -> Self {
        self.exec = Some(spec.into());
        self
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Decide the node kind. `mappers` takes precedence over `exec`.
    pub fn kind(&self) -> Option<NodeKind> {
        if self.mappers.is_some() {
            Some(NodeKind::Routing)
        } else if self.exec.is_some() {
            Some(NodeKind::Leaf)
        } else {
            None
        }
    }

    /// Fill in `filter` and `description` from a mapping key when unset.
    pub(crate) fn inject_name(&mut self, name: &str) {
        if self.filter.is_none() {
            self.filter = Some(PredicateSpec::Expression(name.to_string()));
        }
        if self.description.is_none() {
            self.description = Some(name.to_string());
        }
    }
}

impl RuleSpec {
    /// Classify a JSON rule document.
    pub fn from_value(value: &Value) -> Result<Self, RuleError> {
        classify(value, "$")
    }

    /// Build a name mapping, preserving the given order.
    pub fn named<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, RuleSpec)>,
        S: Into<String>,
    {
        Self::Named(
            entries
                .into_iter()
                .map(|(name, spec)| (name.into(), spec))
                .collect(),
        )
    }
}

impl From<RuleFields> for RuleSpec {
    fn from(fields: RuleFields) -> Self {
        Self::Rule(fields)
    }
}

impl From<Vec<RuleSpec>> for RuleSpec {
    fn from(items: Vec<RuleSpec>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<RuleFields>> for RuleSpec {
    fn from(items: Vec<RuleFields>) -> Self {
        Self::List(items.into_iter().map(RuleSpec::Rule).collect())
    }
}

impl From<&str> for PredicateSpec {
    fn from(expression: &str) -> Self {
        Self::Expression(expression.to_string())
    }
}

impl From<Predicate> for PredicateSpec {
    fn from(predicate: Predicate) -> Self {
        Self::Function(predicate)
    }
}

impl From<Vec<PredicateSpec>> for PredicateSpec {
    fn from(items: Vec<PredicateSpec>) -> Self {
        Self::AnyOf(items)
    }
}

impl From<&str> for TransformSpec {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<Transform> for TransformSpec {
    fn from(transform: Transform) -> Self {
        Self::Function(transform)
    }
}

impl fmt::Debug for PredicateSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Expression(text) => f.debug_tuple("Expression").field(text).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::AnyOf(items) => f.debug_tuple("AnyOf").field(items).finish(),
        }
    }
}

impl fmt::Debug for TransformSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Function(_) => f.write_str("Function(..)"),
        }
    }
}

impl fmt::Debug for RuleFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleFields")
            .field("filter", &self.filter)
            .field("ignore", &self.ignore)
            .field("exclude", &self.exclude)
            .field("default", &self.default)
            .field("mappers", &self.mappers)
            .field("exec", &self.exec)
            .field("description", &self.description)
            .finish()
    }
}

impl fmt::Debug for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("Absent"),
            Self::List(items) => f.debug_tuple("List").field(items).finish(),
            Self::Rule(fields) => fields.fmt(f),
            Self::Named(entries) => f.debug_tuple("Named").field(entries).finish(),
        }
    }
}

fn classify(value: &Value, at: &str) -> Result<RuleSpec, RuleError> {
    match value {
        Value::Null => Ok(RuleSpec::Absent),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| classify(item, &format!("{at}[{index}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(RuleSpec::List),
        Value::Object(fields) if fields.contains_key("mappers") || fields.contains_key("exec") => {
            classify_rule(fields, at).map(RuleSpec::Rule)
        }
        Value::Object(fields) if fields.keys().any(|key| RULE_KEYS.contains(&key.as_str())) => Err(
            RuleError::configuration(at, "rule has neither `mappers` nor `exec`"),
        ),
        Value::Object(fields) => classify_named(fields, at),
        other => Err(RuleError::configuration(
            at,
            format!("expected a rule object, list or null, found {}", kind_name(other)),
        )),
    }
}

fn classify_named(fields: &Map<String, Value>, at: &str) -> Result<RuleSpec, RuleError> {
    let mut entries = Vec::with_capacity(fields.len());
    for (name, value) in fields {
        let entry_at = format!("{at}.{name}");
        if !(value.is_object() || value.is_array()) {
            return Err(RuleError::configuration(
                &entry_at,
                format!("expected a rule object or list, found {}", kind_name(value)),
            ));
        }
        entries.push((name.clone(), classify(value, &entry_at)?));
    }
    Ok(RuleSpec::Named(entries))
}

fn classify_rule(fields: &Map<String, Value>, at: &str) -> Result<RuleFields, RuleError> {
    let mappers = match fields.get("mappers") {
        None | Some(Value::Null) => None,
        Some(value) => Some(Box::new(classify(value, &format!("{at}.mappers"))?)),
    };
    let description = match fields.get("description") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) => Some(text.clone()),
        Some(other) => {
            return Err(RuleError::configuration(
                &format!("{at}.description"),
                format!("expected a string, found {}", kind_name(other)),
            ));
        }
    };

    Ok(RuleFields {
        filter: predicate_field(fields, "filter", at)?,
        ignore: predicate_field(fields, "ignore", at)?,
        exclude: predicate_field(fields, "exclude", at)?,
        default: transform_field(fields, "default", at)?,
        mappers,
        exec: transform_field(fields, "exec", at)?,
        description,
    })
}

fn predicate_field(
    fields: &Map<String, Value>,
    key: &str,
    at: &str,
) -> Result<Option<PredicateSpec>, RuleError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => parse_predicate(value, &format!("{at}.{key}")).map(Some),
    }
}

fn parse_predicate(value: &Value, at: &str) -> Result<PredicateSpec, RuleError> {
    match value {
        Value::String(expression) => Ok(PredicateSpec::Expression(expression.clone())),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(index, item)| parse_predicate(item, &format!("{at}[{index}]")))
            .collect::<Result<Vec<_>, _>>()
            .map(PredicateSpec::AnyOf),
        Value::Object(reference) => match (reference.len(), reference.get("fn")) {
            (1, Some(Value::String(name))) => Ok(PredicateSpec::Named(name.clone())),
            _ => Err(RuleError::configuration(
                at,
                "expected a predicate reference of the form {\"fn\": \"<name>\"}",
            )),
        },
        other => Err(RuleError::configuration(
            at,
            format!(
                "expected an expression, list or reference, found {}",
                kind_name(other)
            ),
        )),
    }
}

fn transform_field(
    fields: &Map<String, Value>,
    key: &str,
    at: &str,
) -> Result<Option<TransformSpec>, RuleError> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(name)) => Ok(Some(TransformSpec::Named(name.clone()))),
        Some(other) => Err(RuleError::configuration(
            &format!("{at}.{key}"),
            format!("expected a transform name, found {}", kind_name(other)),
        )),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
