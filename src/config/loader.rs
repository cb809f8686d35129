//! Configuration loading

use std::path::Path;

use crate::config::Config;
use crate::error::{ProxyError, Result};

/// Load and validate configuration from a YAML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ProxyError::Config(format!("failed to read {}: {}", path.display(), e)))?;
    load_config_from_str(&contents)
}

/// Load and validate configuration from a YAML string.
pub fn load_config_from_str(contents: &str) -> Result<Config> {
    let config: Config = serde_yaml::from_str(contents)?;
    config.validate().map_err(ProxyError::Config)?;
    Ok(config)
}
