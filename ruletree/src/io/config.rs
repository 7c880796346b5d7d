//! Engine configuration stored in `ruletree.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::builtins::{apply_profile_transform, has_profile_from_list};
use crate::core::collection::CollectionLayout;
use crate::core::predicate::Variables;
use crate::core::registry::Registry;

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE: &str = "ruletree.toml";

/// Ruletree configuration (TOML).
///
/// Every section is optional; a missing file behaves like an empty one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RuletreeConfig {
    /// Field names of the collection envelope.
    pub layout: CollectionLayout,

    /// Values bound as `%name` in every compiled expression.
    pub variables: Variables,

    /// Profile URIs registered as named transforms (`name = "uri"`).
    pub profiles: BTreeMap<String, String>,

    /// Named predicates that match documents declaring any of the listed
    /// profile URIs in `meta.profile` (`name = ["uri", ...]`).
    pub profile_filters: BTreeMap<String, Vec<String>>,
}

impl RuletreeConfig {
    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        for (key, value) in [
            ("layout.discriminator", &layout.discriminator),
            ("layout.kind", &layout.kind),
            ("layout.entries", &layout.entries),
            ("layout.document", &layout.document),
            ("layout.identifier", &layout.identifier),
            ("layout.id_field", &layout.id_field),
        ] {
            if value.trim().is_empty() {
                return Err(anyhow!("{key} must be a non-empty string"));
            }
        }
        for (name, uri) in &self.profiles {
            if name.trim().is_empty() {
                return Err(anyhow!("profile names must be non-empty"));
            }
            if uri.trim().is_empty() {
                return Err(anyhow!("profiles.{name} must be a non-empty URI"));
            }
        }
        for (name, uris) in &self.profile_filters {
            if name.trim().is_empty() {
                return Err(anyhow!("profile filter names must be non-empty"));
            }
            if uris.is_empty() || uris.iter().any(|uri| uri.trim().is_empty()) {
                return Err(anyhow!(
                    "profile_filters.{name} must list one or more non-empty URIs"
                ));
            }
        }
        Ok(())
    }

    /// Builtins plus one apply-profile transform per configured profile and
    /// one predicate per profile filter.
    pub fn registry(&self) -> Registry {
        let mut registry = Registry::with_builtins();
        for (name, uri) in &self.profiles {
            registry.insert_transform(name.as_str(), apply_profile_transform(uri.as_str()));
        }
        for (name, uris) in &self.profile_filters {
            let uris = uris.clone();
            registry.register_predicate(name.as_str(), move |document, _context| {
                Ok(Value::Bool(has_profile_from_list(document, &uris)))
            });
        }
        registry
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `RuletreeConfig::default()`.
#[instrument(skip_all)]
pub fn load_config(path: &Path) -> Result<RuletreeConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "config missing; using defaults");
        let cfg = RuletreeConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: RuletreeConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate().with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &RuletreeConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
