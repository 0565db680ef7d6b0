//! Configuration file support for the CLI.
//!
//! The file is a TOML rendition of [`PipelineConfig`]; every key is optional
//! and command-line flags override whatever the file sets.

use std::path::Path;

use anyhow::{Context, Result};
use sheetforge_data::PipelineConfig;

/// Loads the run configuration from `path`, or the defaults without one.
pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let config: PipelineConfig = toml::from_str(&content)
        .with_context(|| format!("invalid config file {}", path.display()))?;
    Ok(config)
}
