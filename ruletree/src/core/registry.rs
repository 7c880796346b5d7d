//! Name lookup for transforms and predicates referenced from rule specs.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::core::builtins;
use crate::core::predicate::Predicate;
use crate::core::transform::Transform;

/// Explicit registry injected into the builder.
#[derive(Clone, Default)]
pub struct Registry {
    transforms: HashMap<String, Transform>,
    predicates: HashMap<String, Predicate>,
}

impl Registry {
    /// Registry pre-populated with `identity` and `drop`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.insert_transform("identity", builtins::identity());
        registry.insert_transform("drop", builtins::discard());
        registry
    }

    pub fn register_transform<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&mut Value, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert_transform(name, Arc::new(f))
    }

    pub fn register_predicate<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&Value, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert_predicate(name, Arc::new(f))
    }

    pub fn insert_transform(&mut self, name: impl Into<String>, transform: Transform) -> &mut Self {
        self.transforms.insert(name.into(), transform);
        self
    }

    pub fn insert_predicate(&mut self, name: impl Into<String>, predicate: Predicate) -> &mut Self {
        self.predicates.insert(name.into(), predicate);
        self
    }

    pub fn transform(&self, name: &str) -> Option<Transform> {
        self.transforms.get(name).cloned()
    }

    pub fn predicate(&self, name: &str) -> Option<Predicate> {
        self.predicates.get(name).cloned()
    }

    /// Registered transform names, sorted.
    pub fn transform_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.transforms.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
