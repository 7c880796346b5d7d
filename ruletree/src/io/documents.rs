//! Document files: discovery, reading and pretty-printed writing.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde_json::Value;
use tracing::instrument;

/// Input document files for `input`.
///
/// A file is returned as-is. A directory yields its `*.json` files (not
/// recursive) sorted by file name.
#[instrument(skip_all)]
pub fn list_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        return Ok(vec![input.to_path_buf()]);
    }
    if !input.is_dir() {
        bail!("input {} does not exist", input.display());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(input).with_context(|| format!("read dir {}", input.display()))? {
        let path = entry
            .with_context(|| format!("read dir entry in {}", input.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Where the mapped form of `input` is written.
///
/// A directory `output` (existing, or required because several inputs are
/// mapped) receives a file named like the input; otherwise `output` is the
/// file itself.
pub fn output_path(output: &Path, input: &Path, into_directory: bool) -> Result<PathBuf> {
    if into_directory || output.is_dir() {
        let name = input
            .file_name()
            .with_context(|| format!("input {} has no file name", input.display()))?;
        return Ok(output.join(name));
    }
    Ok(output.to_path_buf())
}

pub fn read_document(path: &Path) -> Result<Value> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read document {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse document {}", path.display()))
}

/// Serialize `document` to pretty-printed JSON with trailing newline.
pub fn write_document(path: &Path, document: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut payload = serde_json::to_string_pretty(document).context("serialize json")?;
    payload.push('\n');
    fs::write(path, payload).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
