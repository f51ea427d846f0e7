//! Configuration loading.
//!
//! Loading is fail-fast: a missing file, YAML syntax error, or semantic
//! validation failure aborts the run before any window is processed.

use std::path::Path;

use sl_common::{Error, Result};

use crate::model::RunConfig;
use crate::validate::validate;

/// Default configuration path, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Load and validate a run configuration.
pub fn load_config(path: &Path) -> Result<RunConfig> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        Error::Config(format!(
            "could not read configuration file `{}`: {err}",
            path.display()
        ))
    })?;
    let config: RunConfig = serde_yaml::from_str(&text).map_err(|err| {
        Error::Config(format!(
            "malformed configuration `{}`: {err}",
            path.display()
        ))
    })?;
    validate(&config)?;
    Ok(config)
}
