use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use walrelay_config::{validate_config, RelayConfig};

/// Read, resolve and validate a relay config file.
pub fn load_config(path: &Path) -> Result<RelayConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = RelayConfig::parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    config
        .resolve_env()
        .with_context(|| format!("Failed to resolve environment in {}", path.display()))?;

    validate_config(&config).with_context(|| format!("Invalid config: {}", path.display()))?;

    Ok(config)
}
