//! Rule files: JSON documents classified into [`RuleSpec`]s.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::core::spec::RuleSpec;

/// Read and classify a JSON rule file.
///
/// Classification errors keep their [`RuleError`](crate::core::error::RuleError)
/// in the chain so callers can tell malformed rules from I/O failures.
#[instrument(skip_all)]
pub fn load_rules(path: &Path) -> Result<RuleSpec> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read rules {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse rules {}", path.display()))?;
    let spec =
        RuleSpec::from_value(&value).with_context(|| format!("classify rules {}", path.display()))?;
    debug!(path = %path.display(), "loaded rules");
    Ok(spec)
}
