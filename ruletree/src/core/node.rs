//! Compiled rule-tree nodes and their execution.
//!
//! Nodes are immutable once built. Every call to `execute` borrows the
//! document mutably and returns the value that replaces it; callers must
//! always rebind to the returned value. `Value::Null` means "drop".

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::trace;

use crate::core::collection::{CollectionLayout, expand_collection};
use crate::core::error::RuleError;
use crate::core::predicate::Predicate;
use crate::core::transform::Transform;
use crate::core::truthiness::is_true;

const ANONYMOUS: &str = "<anonymous>";

/// A compiled node: either routes documents to children or transforms them.
#[derive(Clone)]
pub enum MapperNode {
    Routing(RoutingNode),
    Leaf(LeafNode),
}

/// Node with ignore/filter/exclude tests, ordered children and a fallback.
#[derive(Clone)]
pub struct RoutingNode {
    pub(crate) description: Option<String>,
    pub(crate) filter: Option<Predicate>,
    pub(crate) ignore: Option<Predicate>,
    pub(crate) exclude: Option<Predicate>,
    pub(crate) default: Option<Transform>,
    pub(crate) children: Vec<MapperNode>,
    pub(crate) layout: Arc<CollectionLayout>,
}

/// Node pairing one predicate with one transform.
#[derive(Clone)]
pub struct LeafNode {
    pub(crate) description: Option<String>,
    pub(crate) filter: Option<Predicate>,
    pub(crate) transform: Transform,
}

impl MapperNode {
    /// Whether a parent routing node should hand `document` to this node.
    pub fn filter(&self, document: &Value, context: &Value) -> Result<bool, RuleError> {
        match self {
            Self::Routing(node) => node.filter(document, context),
            Self::Leaf(node) => node.filter(document, context),
        }
    }

    pub fn execute(&self, document: &mut Value, context: &Value) -> Result<Value, RuleError> {
        match self {
            Self::Routing(node) => node.execute(document, context),
            Self::Leaf(node) => node.execute(document, context),
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            Self::Routing(node) => node.description(),
            Self::Leaf(node) => node.description(),
        }
    }

    /// Number of nodes in this subtree, including itself.
    pub fn node_count(&self) -> usize {
        match self {
            Self::Routing(node) => 1 + node.children.iter().map(Self::node_count).sum::<usize>(),
            Self::Leaf(_) => 1,
        }
    }
}

impl RoutingNode {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn children(&self) -> &[MapperNode] {
        &self.children
    }

    pub fn layout(&self) -> &CollectionLayout {
        &self.layout
    }

    /// An absent filter matches nothing.
    pub fn filter(&self, document: &Value, context: &Value) -> Result<bool, RuleError> {
        test(self.filter.as_ref(), self.label(), document, context)
    }

    /// An absent ignore test never ignores.
    pub fn ignore(&self, document: &Value, context: &Value) -> Result<bool, RuleError> {
        test(self.ignore.as_ref(), self.label(), document, context)
    }

    /// An absent exclude test never excludes.
    pub fn exclude(&self, document: &Value, context: &Value) -> Result<bool, RuleError> {
        test(self.exclude.as_ref(), self.label(), document, context)
    }

    /// Apply the fallback transform, or hand the document back unchanged.
    pub fn default(&self, document: &mut Value, context: &Value) -> Result<Value, RuleError> {
        match &self.default {
            Some(transform) => apply(transform, self.label(), document, context),
            None => Ok(std::mem::take(document)),
        }
    }

    /// Route a document, a list of documents, or a collection document.
    pub fn execute(&self, document: &mut Value, context: &Value) -> Result<Value, RuleError> {
        if let Value::Array(items) = document {
            return map_list(items, |item| self.execute(item, context));
        }
        if self.layout.is_collection(document) {
            expand_collection(&self.layout, document, |sub| self.route(sub, context))?;
            return Ok(std::mem::take(document));
        }
        self.route(document, context)
    }

    fn route(&self, document: &mut Value, context: &Value) -> Result<Value, RuleError> {
        if self.ignore(document, context)? || !self.filter(document, context)? {
            trace!(node = self.label(), "pass through");
            return Ok(std::mem::take(document));
        }
        if self.exclude(document, context)? {
            trace!(node = self.label(), "excluded");
            return Ok(Value::Null);
        }
        for (index, child) in self.children.iter().enumerate() {
            if child.filter(document, context)? {
                trace!(
                    node = self.label(),
                    child = child.description().unwrap_or(ANONYMOUS),
                    index,
                    "child matched"
                );
                return child.execute(document, context);
            }
        }
        trace!(
            node = self.label(),
            has_default = self.default.is_some(),
            "no child matched"
        );
        self.default(document, context)
    }

    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(ANONYMOUS)
    }
}

impl LeafNode {
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Queried by the parent; never re-checked inside [`LeafNode::execute`].
    pub fn filter(&self, document: &Value, context: &Value) -> Result<bool, RuleError> {
        test(self.filter.as_ref(), self.label(), document, context)
    }

    pub fn execute(&self, document: &mut Value, context: &Value) -> Result<Value, RuleError> {
        if let Value::Array(items) = document {
            return map_list(items, |item| self.execute(item, context));
        }
        apply(&self.transform, self.label(), document, context)
    }

    fn label(&self) -> &str {
        self.description.as_deref().unwrap_or(ANONYMOUS)
    }
}

fn test(
    predicate: Option<&Predicate>,
    node: &str,
    document: &Value,
    context: &Value,
) -> Result<bool, RuleError> {
    let Some(predicate) = predicate else {
        return Ok(false);
    };
    let result = predicate(document, context).map_err(|source| RuleError::Predicate {
        node: node.to_string(),
        source,
    })?;
    Ok(is_true(&result))
}

fn apply(
    transform: &Transform,
    node: &str,
    document: &mut Value,
    context: &Value,
) -> Result<Value, RuleError> {
    transform(document, context).map_err(|source| RuleError::Transform {
        node: node.to_string(),
        source,
    })
}

/// Map each element, keeping order and dropping null results.
fn map_list<F>(items: &mut [Value], mut f: F) -> Result<Value, RuleError>
where
    F: FnMut(&mut Value) -> Result<Value, RuleError>,
{
    let mut mapped = Vec::with_capacity(items.len());
    for item in items {
        let result = f(item)?;
        if !result.is_null() {
            mapped.push(result);
        }
    }
    Ok(Value::Array(mapped))
}

impl fmt::Debug for MapperNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Routing(node) => node.fmt(f),
            Self::Leaf(node) => node.fmt(f),
        }
    }
}

impl fmt::Debug for RoutingNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingNode")
            .field("description", &self.description)
            .field("filter", &self.filter.is_some())
            .field("ignore", &self.ignore.is_some())
            .field("exclude", &self.exclude.is_some())
            .field("default", &self.default.is_some())
            .field("children", &self.children)
            .finish()
    }
}

impl fmt::Debug for LeafNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafNode")
            .field("description", &self.description)
            .field("filter", &self.filter.is_some())
            .finish_non_exhaustive()
    }
}
