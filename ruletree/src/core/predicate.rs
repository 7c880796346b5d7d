//! Predicate construction from expressions, functions and lists.

use std::sync::Arc;

use anyhow::Result;
use serde_json::{Map, Value};

use crate::core::error::RuleError;
use crate::core::registry::Registry;
use crate::core::spec::PredicateSpec;
use crate::core::truthiness::is_true;

/// Values bound into every compiled expression.
pub type Variables = Map<String, Value>;

/// A compiled expression with its variables already bound.
pub type Query = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// A test over `(document, context)`. The raw result is normalized by callers.
pub type Predicate = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;

/// Compiles textual expressions into queries.
pub trait Evaluator {
    /// Compile `expression` once; the returned query is run per document.
    fn compile(&self, expression: &str, variables: &Variables) -> Result<Query>;
}

/// Wrap a closure as a [`Predicate`].
pub fn predicate<F>(f: F) -> Predicate
where
    F: Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Turns [`PredicateSpec`]s into callable predicates.
pub struct PredicateBuilder<'a> {
    evaluator: &'a dyn Evaluator,
    registry: &'a Registry,
    variables: &'a Variables,
}

impl<'a> PredicateBuilder<'a> {
    pub fn new(
        evaluator: &'a dyn Evaluator,
        registry: &'a Registry,
        variables: &'a Variables,
    ) -> Self {
        Self {
            evaluator,
            registry,
            variables,
        }
    }

    /// Build an optional predicate; an absent spec yields no predicate.
    pub fn build_optional(
        &self,
        spec: Option<&PredicateSpec>,
        at: &str,
    ) -> Result<Option<Predicate>, RuleError> {
        spec.map(|spec| self.build(spec, at)).transpose()
    }

    pub fn build(&self, spec: &PredicateSpec, at: &str) -> Result<Predicate, RuleError> {
        match spec {
            PredicateSpec::Function(predicate) => Ok(Arc::clone(predicate)),
            PredicateSpec::Named(name) => self.registry.predicate(name).ok_or_else(|| {
                RuleError::configuration(at, format!("unknown predicate `{name}`"))
            }),
            PredicateSpec::Expression(expression) => {
                let query = self
                    .evaluator
                    .compile(expression, self.variables)
                    .map_err(|source| RuleError::Expression {
                        at: at.to_string(),
                        expression: expression.clone(),
                        source,
                    })?;
                Ok(predicate(move |document, _context| {
                    Ok(Value::Bool(is_true(&query(document)?)))
                }))
            }
            PredicateSpec::AnyOf(items) => {
                let members = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.build(item, &format!("{at}[{index}]")))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(predicate(move |document, context| {
                    for member in &members {
                        if is_true(&member(document, context)?) {
                            return Ok(Value::Bool(true));
                        }
                    }
                    Ok(Value::Bool(false))
                }))
            }
        }
    }
}
