//! Test-only helpers for building documents, registries and scratch workspaces.

#[cfg(feature = "test-support")]
use std::fs;
#[cfg(feature = "test-support")]
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "test-support")]
use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::core::registry::Registry;
use crate::core::transform::{Transform, transform};

/// Transform that records `label` under `mapped` and returns the document.
pub fn mark(label: &str) -> Transform {
    let label = label.to_string();
    transform(move |document, _context| {
        document["mapped"] = Value::String(label.clone());
        Ok(std::mem::take(document))
    })
}

/// Transform that counts its invocations and returns the document unchanged.
pub fn counting() -> (Transform, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let counted = transform(move |document, _context| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(std::mem::take(document))
    });
    (counted, calls)
}

/// Registry with builtins, `mark_a`/`mark_b` transforms and an `always` predicate.
pub fn registry_with_marks() -> Registry {
    let mut registry = Registry::with_builtins();
    registry
        .insert_transform("mark_a", mark("a"))
        .insert_transform("mark_b", mark("b"))
        .register_predicate("always", |_document, _context| Ok(Value::Bool(true)));
    registry
}

/// Minimal document of the given kind and id.
pub fn doc(kind: &str, id: &str) -> Value {
    json!({"resourceType": kind, "id": id})
}

/// Collection document wrapping `documents`, one entry each.
pub fn bundle(documents: Vec<Value>) -> Value {
    let entries: Vec<Value> = documents
        .into_iter()
        .map(|document| {
            let id = document["id"].as_str().unwrap_or_default().to_string();
            json!({
                "fullUrl": format!("urn:uuid:{id}"),
                "resource": document,
                "request": {"method": "POST", "url": id}
            })
        })
        .collect();
    json!({"resourceType": "Bundle", "type": "transaction", "entry": entries})
}

/// Scratch directory holding rule, config and document files.
#[cfg(feature = "test-support")]
pub struct Workspace {
    dir: tempfile::TempDir,
}

#[cfg(feature = "test-support")]
impl Workspace {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("create tempdir")?,
        })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }

    /// Write `value` as pretty JSON at `relative`, creating parent directories.
    pub fn write_json(&self, relative: &str, value: &Value) -> Result<PathBuf> {
        let mut payload = serde_json::to_string_pretty(value).context("serialize json")?;
        payload.push('\n');
        self.write(relative, &payload)
    }

    pub fn write(&self, relative: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }

    pub fn read_json(&self, relative: &str) -> Result<Value> {
        let path = self.path(relative);
        let contents =
            fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
    }
}
