//! Collection documents: envelopes owning an ordered list of sub-documents.
//!
//! Mapping a collection rewrites each entry's sub-document in place. When a
//! sub-document maps to several documents, the first stays in the original
//! entry (keeping its identifier and transport metadata) and the rest become
//! new entries appended after every original entry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::core::error::RuleError;

/// Field names describing the collection envelope.
///
/// Defaults match a FHIR `Bundle`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectionLayout {
    /// Field naming a document's kind.
    pub discriminator: String,
    /// Discriminator value marking a collection document.
    pub kind: String,
    /// Field holding the ordered entry list.
    pub entries: String,
    /// Entry field holding the sub-document.
    pub document: String,
    /// Entry field holding the stable identifier.
    pub identifier: String,
    /// Sub-document field used to derive identifiers for new entries.
    pub id_field: String,
    /// Prefix prepended to the sub-document id to form an identifier.
    pub identifier_prefix: String,
}

impl Default for CollectionLayout {
    fn default() -> Self {
        Self {
            discriminator: "resourceType".to_string(),
            kind: "Bundle".to_string(),
            entries: "entry".to_string(),
            document: "resource".to_string(),
            identifier: "fullUrl".to_string(),
            id_field: "id".to_string(),
            identifier_prefix: "urn:uuid:".to_string(),
        }
    }
}

impl CollectionLayout {
    pub fn is_collection(&self, document: &Value) -> bool {
        document.get(&self.discriminator).and_then(Value::as_str) == Some(self.kind.as_str())
    }

    /// Wrap a sub-document produced by expansion in a fresh entry.
    pub fn new_entry(&self, document: Value) -> Value {
        let mut entry = Map::new();
        match document.get(&self.id_field) {
            Some(Value::String(id)) => {
                entry.insert(
                    self.identifier.clone(),
                    Value::String(format!("{}{}", self.identifier_prefix, id)),
                );
            }
            Some(Value::Number(id)) => {
                entry.insert(
                    self.identifier.clone(),
                    Value::String(format!("{}{}", self.identifier_prefix, id)),
                );
            }
            _ if document.is_null() => {}
            _ => warn!(
                field = %self.id_field,
                "expanded document has no id; entry left without identifier"
            ),
        }
        entry.insert(self.document.clone(), document);
        Value::Object(entry)
    }

    fn has_document(&self, entry: &Value) -> bool {
        entry.get(&self.document).is_some_and(|doc| !doc.is_null())
    }
}

/// Run `map` over every entry's sub-document and splice the results back.
///
/// Entries whose sub-document ends up null (or was missing) are removed.
/// A collection without an entry list is left untouched. Entries appended by
/// expansion are not mapped again.
pub fn expand_collection<F>(
    layout: &CollectionLayout,
    collection: &mut Value,
    mut map: F,
) -> Result<(), RuleError>
where
    F: FnMut(&mut Value) -> Result<Value, RuleError>,
{
    let Some(entries) = collection
        .get_mut(&layout.entries)
        .and_then(Value::as_array_mut)
    else {
        return Ok(());
    };

    let original = entries.len();
    let mut appended = Vec::new();
    for entry in &mut *entries {
        let Some(slot) = entry.get_mut(&layout.document) else {
            continue;
        };
        match map(slot)? {
            Value::Array(mut mapped) => {
                let rest = if mapped.is_empty() {
                    Vec::new()
                } else {
                    mapped.split_off(1)
                };
                *slot = mapped.pop().unwrap_or(Value::Null);
                appended.extend(rest.into_iter().map(|doc| layout.new_entry(doc)));
            }
            single => *slot = single,
        }
    }

    let added = appended.len();
    entries.extend(appended);
    entries.retain(|entry| layout.has_document(entry));
    debug!(
        original,
        added,
        kept = entries.len(),
        "expanded collection"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle(entries: Value) -> Value {
        json!({"resourceType": "Bundle", "type": "collection", "entry": entries})
    }

    #[test]
    fn detects_collection_by_discriminator() {
        let layout = CollectionLayout::default();
        assert!(layout.is_collection(&bundle(json!([]))));
        assert!(!layout.is_collection(&json!({"resourceType": "Patient"})));
        assert!(!layout.is_collection(&json!(["Bundle"])));
    }

    #[test]
    fn single_results_replace_in_place_keeping_metadata() {
        let layout = CollectionLayout::default();
        let mut collection = bundle(json!([
            {"fullUrl": "urn:uuid:1", "resource": {"id": "1"}, "request": {"method": "POST"}, "search": {"mode": "match"}}
        ]));
        expand_collection(&layout, &mut collection, |doc| {
            doc["seen"] = json!(true);
            Ok(std::mem::take(doc))
        })
        .expect("expand");
        assert_eq!(
            collection["entry"],
            json!([{
                "fullUrl": "urn:uuid:1",
                "resource": {"id": "1", "seen": true},
                "request": {"method": "POST"},
                "search": {"mode": "match"}
            }])
        );
    }

    #[test]
    fn list_results_append_new_entries_after_originals() {
        let layout = CollectionLayout::default();
        let mut collection = bundle(json!([
            {"fullUrl": "urn:uuid:a", "resource": {"id": "a"}, "request": {"method": "POST"}},
            {"fullUrl": "urn:uuid:b", "resource": {"id": "b"}}
        ]));
        expand_collection(&layout, &mut collection, |doc| {
            if doc["id"] == "a" {
                Ok(json!([{"id": "a1"}, {"id": "a2"}, {"id": 7}]))
            } else {
                Ok(std::mem::take(doc))
            }
        })
        .expect("expand");
        assert_eq!(
            collection["entry"],
            json!([
                {"fullUrl": "urn:uuid:a", "resource": {"id": "a1"}, "request": {"method": "POST"}},
                {"fullUrl": "urn:uuid:b", "resource": {"id": "b"}},
                {"fullUrl": "urn:uuid:a2", "resource": {"id": "a2"}},
                {"fullUrl": "urn:uuid:7", "resource": {"id": 7}}
            ])
        );
    }

    #[test]
    fn null_results_and_empty_lists_drop_entries() {
        let layout = CollectionLayout::default();
        let mut collection = bundle(json!([
            {"fullUrl": "1", "resource": {"id": "1"}},
            {"fullUrl": "2", "resource": {"id": "2"}},
            {"fullUrl": "3", "resource": {"id": "3"}},
            {"fullUrl": "4"}
        ]));
        expand_collection(&layout, &mut collection, |doc| match doc["id"].as_str() {
            Some("1") => Ok(Value::Null),
            Some("2") => Ok(json!([])),
            Some("3") => Ok(json!([{"id": "3"}, null])),
            _ => Ok(std::mem::take(doc)),
        })
        .expect("expand");
        assert_eq!(
            collection["entry"],
            json!([{"fullUrl": "3", "resource": {"id": "3"}}])
        );
    }

    #[test]
    fn new_entry_without_id_has_no_identifier() {
        let layout = CollectionLayout::default();
        assert_eq!(
            layout.new_entry(json!({"resourceType": "Patient"})),
            json!({"resource": {"resourceType": "Patient"}})
        );
    }

    #[test]
    fn collection_without_entries_is_untouched() {
        let layout = CollectionLayout::default();
        let mut collection = json!({"resourceType": "Bundle"});
        expand_collection(&layout, &mut collection, |_| Ok(Value::Null)).expect("expand");
        assert_eq!(collection, json!({"resourceType": "Bundle"}));
    }

    #[test]
    fn error_stops_midway_leaving_earlier_entries_mapped() {
        let layout = CollectionLayout::default();
        let mut collection = bundle(json!([
            {"resource": {"id": "1"}},
            {"resource": {"id": "2"}}
        ]));
        let err = expand_collection(&layout, &mut collection, |doc| {
            if doc["id"] == "2" {
                return Err(RuleError::Transform {
                    node: "test".to_string(),
                    source: anyhow::anyhow!("boom"),
                });
            }
            doc["seen"] = json!(true);
            Ok(std::mem::take(doc))
        })
        .expect_err("should fail");
        assert!(matches!(err, RuleError::Transform { .. }));
        assert_eq!(collection["entry"][0]["resource"]["seen"], json!(true));
    }
}
