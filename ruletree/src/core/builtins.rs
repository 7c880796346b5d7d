//! Reusable transforms and document helpers for rule authors.
//!
//! [`identity`], [`discard`] and [`apply_profile_transform`] are reachable
//! from rule files through the registry, and so is [`has_profile_from_list`]
//! via the `[profile_filters]` config table. [`add_extension`],
//! [`add_related`] and [`find_in_context`] are library helpers for
//! transforms written in Rust and registered with
//! [`Registry::register_transform`](crate::core::registry::Registry::register_transform).

use anyhow::{Result, bail};
use serde_json::{Map, Value, json};

use crate::core::predicate::Query;
use crate::core::transform::{Transform, transform};
use crate::core::truthiness::is_true;

/// Returns the document as it is.
pub fn identity() -> Transform {
    transform(|document, _context| Ok(std::mem::take(document)))
}

/// Drops every document it is applied to.
pub fn discard() -> Transform {
    transform(|_document, _context| Ok(Value::Null))
}

/// Put `profile` first in `meta.profile`, creating the path as needed.
///
/// Fails without touching the document when it is not an object, or when an
/// existing `meta` is not an object or `meta.profile` is not a list.
pub fn apply_profile(document: &mut Value, profile: &str) -> Result<()> {
    let Some(fields) = document.as_object_mut() else {
        bail!("cannot apply profile `{profile}`: document is not an object");
    };
    let meta = fields
        .entry("meta")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(meta) = meta.as_object_mut() else {
        bail!("cannot apply profile `{profile}`: `meta` is not an object");
    };
    let profiles = meta.entry("profile").or_insert_with(|| json!([]));
    let Some(list) = profiles.as_array_mut() else {
        bail!("cannot apply profile `{profile}`: `meta.profile` is not a list");
    };
    list.insert(0, Value::String(profile.to_string()));
    Ok(())
}

/// Transform that applies a fixed profile.
pub fn apply_profile_transform(profile: impl Into<String>) -> Transform {
    let profile = profile.into();
    transform(move |document, _context| {
        apply_profile(document, &profile)?;
        Ok(std::mem::take(document))
    })
}

/// Append to the document's `extension` list.
pub fn add_extension(document: &mut Value, extension: Value) {
    push_to_list(document, "extension", extension);
}

/// Record that `document` relates to `from` as `kind`.
///
/// Does nothing unless `from` has both a discriminator and an id.
pub fn add_related(document: &mut Value, kind: &str, from: &Value, discriminator: &str) {
    let (Some(from_kind), Some(from_id)) = (
        from.get(discriminator).and_then(Value::as_str),
        from.get("id").and_then(Value::as_str),
    ) else {
        return;
    };
    push_to_list(
        document,
        "related",
        json!({
            "type": kind,
            "target": {"reference": format!("{from_kind}/{from_id}")}
        }),
    );
}

/// True if any of the document's `meta.profile` entries is in `profiles`.
pub fn has_profile_from_list<S: AsRef<str>>(document: &Value, profiles: &[S]) -> bool {
    document
        .pointer("/meta/profile")
        .and_then(Value::as_array)
        .is_some_and(|declared| {
            declared.iter().filter_map(Value::as_str).any(|profile| {
                profiles
                    .iter()
                    .any(|candidate| candidate.as_ref() == profile)
            })
        })
}

/// First document in `context` that `query` matches.
///
/// `context` may be a collection (its entries' sub-documents are searched,
/// using `entries`/`document` as the envelope field names) or a plain list.
pub fn find_in_context<'a>(
    context: &'a Value,
    query: &Query,
    entries: &str,
    document: &str,
) -> Result<Option<&'a Value>> {
    let candidates: Vec<&Value> = match context.get(entries).and_then(Value::as_array) {
        Some(list) => list.iter().filter_map(|entry| entry.get(document)).collect(),
        None => match context.as_array() {
            Some(list) => list.iter().collect(),
            None => Vec::new(),
        },
    };
    for candidate in candidates {
        if is_true(&query(candidate)?) {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

fn push_to_list(document: &mut Value, key: &str, item: Value) {
    let Some(fields) = document.as_object_mut() else {
        return;
    };
    let slot = fields.entry(key).or_insert_with(|| json!([]));
    if !slot.is_array() {
        *slot = json!([]);
    }
    if let Some(list) = slot.as_array_mut() {
        list.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::path::PathEvaluator;
    use crate::core::predicate::{Evaluator, Variables};

    #[test]
    fn apply_profile_goes_first() {
        let mut document = json!({"resourceType": "Condition", "meta": {"profile": ["b"]}});
        apply_profile(&mut document, "a").expect("apply");
        assert_eq!(document["meta"]["profile"], json!(["a", "b"]));

        let mut bare = json!({"resourceType": "Condition"});
        apply_profile(&mut bare, "a").expect("apply");
        assert_eq!(bare["meta"]["profile"], json!(["a"]));
    }

    #[test]
    fn apply_profile_rejects_malformed_meta() {
        for original in [
            json!({"resourceType": "Condition", "meta": {"profile": "b"}}),
            json!({"resourceType": "Condition", "meta": "v1"}),
            json!(["not", "a", "document"]),
        ] {
            let mut document = original.clone();
            let err = apply_profile(&mut document, "a").expect_err("should fail");
            assert!(err.to_string().contains("cannot apply profile `a`"), "{err}");
            assert_eq!(document, original);
        }
    }

    #[test]
    fn profile_transform_fails_on_malformed_profile_list() {
        let apply = apply_profile_transform("urn:profile");
        let mut document = json!({"resourceType": "Patient", "meta": {"profile": {"x": 1}}});
        let err = apply(&mut document, &Value::Null).err().expect("should fail");
        assert!(err.to_string().contains("`meta.profile` is not a list"), "{err}");
        assert_eq!(document["meta"]["profile"], json!({"x": 1}));
    }

    #[test]
    fn profile_transform_returns_updated_document() {
        let apply = apply_profile_transform("urn:profile");
        let mut document = json!({"resourceType": "Patient"});
        let out = apply(&mut document, &Value::Null).expect("run");
        assert_eq!(out["meta"]["profile"], json!(["urn:profile"]));
    }

    #[test]
    fn discard_returns_null() {
        let mut document = json!({"resourceType": "Patient"});
        assert!(discard()(&mut document, &Value::Null).expect("run").is_null());
    }

    #[test]
    fn add_related_uses_reference_of_source() {
        let mut document = json!({"resourceType": "Observation"});
        let from = json!({"resourceType": "Condition", "id": "c1"});
        add_related(&mut document, "derived-from", &from, "resourceType");
        assert_eq!(
            document["related"],
            json!([{"type": "derived-from", "target": {"reference": "Condition/c1"}}])
        );

        let mut untouched = json!({"resourceType": "Observation"});
        add_related(&mut untouched, "x", &json!({"id": "1"}), "resourceType");
        assert!(untouched.get("related").is_none());
    }

    #[test]
    fn add_extension_appends() {
        let mut document = json!({"extension": [{"url": "a"}]});
        add_extension(&mut document, json!({"url": "b"}));
        assert_eq!(document["extension"], json!([{"url": "a"}, {"url": "b"}]));
    }

    #[test]
    fn has_profile_checks_declared_profiles() {
        let document = json!({"meta": {"profile": ["x", "mcode"]}});
        assert!(has_profile_from_list(&document, &["mcode"]));
        assert!(!has_profile_from_list(&document, &["other"]));
        assert!(!has_profile_from_list(&json!({}), &["mcode"]));
    }

    #[test]
    fn find_in_context_searches_collection_entries() {
        let query = PathEvaluator::default()
            .compile("Condition.code = 'c2'", &Variables::new())
            .expect("compile");
        let context = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Condition", "id": "1", "code": "c1"}},
                {"resource": {"resourceType": "Condition", "id": "2", "code": "c2"}}
            ]
        });
        let found = find_in_context(&context, &query, "entry", "resource").expect("find");
        assert_eq!(found.and_then(|doc| doc.get("id")), Some(&json!("2")));

        let list = json!([{"resourceType": "Patient"}]);
        let found = find_in_context(&list, &query, "entry", "resource").expect("find");
        assert!(found.is_none());
    }
}
