//! Configuration module for routing-engine
//!
//! This module provides configuration types and loading utilities.
//!
//! # Example
//!
//! ```no_run
//! use routing_engine::config::{load_config, Config};
//!
//! let config = load_config("/etc/routing-engine/config.json").unwrap();
//! println!("Rules: {}", config.routing.rules.len());
//! ```

mod loader;
mod types;

pub use loader::{
    load_config, load_config_str, load_config_with_env, parse_rule_set, ENV_DOMAIN_STRATEGY,
    ENV_LOG_LEVEL,
};
pub use types::{
    BalancerConfig, ConditionConfig, Config, DomainStrategy, LogConfig, LogicalConfig,
    LogicalMode, PortSpec, RouterConfig, RuleConfig, RuleTargetRef, StrategyConfig,
    StrategySettings,
};
