//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::IngressConfig;
use crate::config::validation::{validate_config, ConfigIssue};
use crate::routing::compile::compile_ingresses;
use crate::routing::RuleSetRejected;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join(.0))]
    Invalid(Vec<ConfigIssue>),

    #[error(transparent)]
    Rules(#[from] RuleSetRejected),
}

fn join(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parse and validate configuration text. Ingress rules are compiled as a
/// check so that malformed patterns are reported at load time.
pub fn parse_config(content: &str) -> Result<IngressConfig, ConfigError> {
    let config: IngressConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Invalid)?;
    compile_ingresses(&config.ingresses)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<IngressConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}
