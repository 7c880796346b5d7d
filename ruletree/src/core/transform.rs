//! Transform callables and their resolution from specs.

use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use crate::core::error::RuleError;
use crate::core::registry::Registry;
use crate::core::spec::TransformSpec;

/// Rewrites a document. The input may be mutated; the return value is what
/// the engine keeps. `Value::Null` drops the document and `Value::Array`
/// yields several documents.
pub type Transform = Arc<dyn Fn(&mut Value, &Value) -> Result<Value> + Send + Sync>;

/// Wrap a closure as a [`Transform`].
pub fn transform<F>(f: F) -> Transform
where
    F: Fn(&mut Value, &Value) -> Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Resolve a transform spec against the registry.
pub fn resolve_transform(
    spec: &TransformSpec,
    registry: &Registry,
    at: &str,
) -> Result<Transform, RuleError> {
    match spec {
        TransformSpec::Function(transform) => Ok(Arc::clone(transform)),
        TransformSpec::Named(name) => registry
            .transform(name)
            .ok_or_else(|| RuleError::configuration(at, format!("unknown transform `{name}`"))),
    }
}

pub fn resolve_optional(
    spec: Option<&TransformSpec>,
    registry: &Registry,
    at: &str,
) -> Result<Option<Transform>, RuleError> {
    spec.map(|spec| resolve_transform(spec, registry, at)).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn function_is_returned_unchanged() {
        let original = transform(|document, _| Ok(std::mem::take(document)));
        let resolved = resolve_transform(
            &TransformSpec::Function(Arc::clone(&original)),
            &Registry::default(),
            "$.exec",
        )
        .expect("resolve");
        assert!(Arc::ptr_eq(&original, &resolved));
    }

    #[test]
    fn named_transform_resolves_through_registry() {
        let mut registry = Registry::default();
        registry.register_transform("mark", |document, _| {
            document["mapped"] = json!(true);
            Ok(std::mem::take(document))
        });
        let resolved = resolve_transform(&TransformSpec::from("mark"), &registry, "$.exec")
            .expect("resolve");
        let mut document = json!({"resourceType": "Patient"});
        let out = resolved(&mut document, &Value::Null).expect("run");
        assert_eq!(out["mapped"], json!(true));
    }

    #[test]
    fn unknown_name_is_a_configuration_error() {
        let err = resolve_transform(&TransformSpec::from("nope"), &Registry::default(), "$.exec")
            .err()
            .expect("should fail");
        assert!(matches!(err, RuleError::Configuration { .. }));
        assert!(err.to_string().contains("unknown transform `nope`"));
    }

    #[test]
    fn absent_spec_yields_no_transform() {
        let resolved = resolve_optional(None, &Registry::default(), "$.default").expect("resolve");
        assert!(resolved.is_none());
    }
}
