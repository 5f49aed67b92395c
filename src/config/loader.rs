//! Configuration loading and management
//!
//! This module handles loading configuration from files and environment variables.

use std::path::Path;

use tracing::{debug, info};

use super::types::{Config, DomainStrategy, RouterConfig};
use crate::error::ConfigError;

/// Environment variable overriding `log.level`
pub const ENV_LOG_LEVEL: &str = "ROUTING_ENGINE_LOG_LEVEL";

/// Environment variable overriding `routing.domainStrategy`
pub const ENV_DOMAIN_STRATEGY: &str = "ROUTING_ENGINE_DOMAIN_STRATEGY";

/// Load configuration from a JSON file
///
/// # Arguments
///
/// * `path` - Path to the configuration file
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed or validated.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();

    debug!("Loading configuration from {:?}", path);

    if !path.exists() {
        return Err(ConfigError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let contents = std::fs::read_to_string(path)?;

    let config: Config = serde_json::from_str(&contents).map_err(|e| {
        ConfigError::ParseError(format!("Failed to parse JSON: {e} at {path:?}"))
    })?;

    config.validate()?;

    info!(
        "Configuration loaded: {} rules, {} balancers, domainStrategy={}",
        config.routing.rules.len(),
        config.routing.balancers.len(),
        config.routing.domain_strategy
    );

    Ok(config)
}

/// Load configuration from a JSON string
///
/// # Errors
///
/// Returns `ConfigError` if parsing or validation fails.
pub fn load_config_str(json: &str) -> Result<Config, ConfigError> {
    let config: Config =
        serde_json::from_str(json).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;

    Ok(config)
}

/// Load configuration with environment variable overrides
///
/// Environment variables:
/// - `ROUTING_ENGINE_LOG_LEVEL`: Override log level
/// - `ROUTING_ENGINE_DOMAIN_STRATEGY`: Override domain strategy
///
/// # Errors
///
/// Returns `ConfigError` if loading, parsing or an override fails.
pub fn load_config_with_env(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let mut config = load_config(path)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

/// Apply overrides from a variable lookup function
fn apply_env_overrides(
    config: &mut Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(level) = var(ENV_LOG_LEVEL) {
        config.log.level = level;
        debug!("Log level overridden to {}", config.log.level);
    }

    if let Some(strategy) = var(ENV_DOMAIN_STRATEGY) {
        config.routing.domain_strategy =
            strategy
                .parse::<DomainStrategy>()
                .map_err(|_| ConfigError::EnvError {
                    name: ENV_DOMAIN_STRATEGY.into(),
                    reason: format!("Invalid domain strategy: {strategy}"),
                })?;
        debug!(
            "Domain strategy overridden to {}",
            config.routing.domain_strategy
        );
    }

    Ok(())
}

/// Parse a routing rule-set payload for a runtime hot patch
///
/// The payload is a routing object (`{"rules": [...]}`); balancer
/// definitions in it are ignored by the router, whose balancer table is
/// fixed at init.
///
/// # Errors
///
/// Returns `ConfigError::ParseError` if the payload is not valid JSON for a
/// routing object.
pub fn parse_rule_set(json: &str) -> Result<RouterConfig, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::ParseError(format!("Invalid rule set: {e}")))
}
