//! Scaffolding for `ruletree init`.

use std::path::Path;

use anyhow::{Result, anyhow};
use tracing::{debug, instrument};

use super::config::{RuletreeConfig, write_config};

/// Options for [`init_config`].
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// If true, overwrite an existing config file.
    pub force: bool,
}

/// Write the default config to `path`.
///
/// Fails if `path` already exists unless `options.force` is set.
#[instrument(skip_all)]
pub fn init_config(path: &Path, options: &InitOptions) -> Result<RuletreeConfig> {
    if path.is_dir() {
        return Err(anyhow!(
            "ruletree init: {} exists but is not a file",
            path.display()
        ));
    }
    if path.exists() && !options.force {
        return Err(anyhow!(
            "ruletree init: {} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    let config = RuletreeConfig::default();
    write_config(path, &config)?;
    debug!(path = %path.display(), "wrote default config");
    Ok(config)
}
