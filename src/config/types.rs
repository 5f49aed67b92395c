//! Configuration types for routing-engine
//!
//! The routing section mirrors the JSON shape proxy operators already write:
//! `domainStrategy`, an ordered `rules` list and a `balancers` list. All
//! names are camelCase.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::balancer::StrategyKind;
use crate::error::{ConfigError, RuleError};
use crate::rules::Condition;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Logging configuration
    #[serde(default)]
    pub log: LogConfig,

    /// Outbound tags registered at startup
    #[serde(default)]
    pub outbounds: Vec<String>,

    /// Routing configuration
    #[serde(default)]
    pub routing: RouterConfig,
}

impl Config {
    /// Validate the configuration
    ///
    /// Routing rules and balancers are compiled too, so a config that passes
    /// here also passes `Router::init`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log.validate()?;

        let mut tags: HashSet<&str> = HashSet::new();
        for tag in &self.outbounds {
            if tag.is_empty() {
                return Err(ConfigError::ValidationError(
                    "Outbound tag must not be empty".into(),
                ));
            }
            if !tags.insert(tag) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate outbound tag: {tag}"
                )));
            }
        }

        self.routing
            .compile_check()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Include timestamps
    #[serde(default = "default_true")]
    pub timestamps: bool,

    /// Include target (module path)
    #[serde(default = "default_true")]
    pub target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            timestamps: true,
            target: true,
        }
    }
}

impl LogConfig {
    /// Validate the logging configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` for an unknown format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.format.as_str() {
            "json" | "text" => Ok(()),
            other => Err(ConfigError::ValidationError(format!(
                "Unknown log format: {other} (expected json or text)"
            ))),
        }
    }
}

/// When the router may resolve a target domain to match IP conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum DomainStrategy {
    /// Never resolve; IP conditions only see pre-supplied IPs
    #[default]
    AsIs,
    /// Resolution is left to the dispatcher; the router behaves as `AsIs`
    UseIp,
    /// Resolve and evaluate all rules once more if the first pass misses
    IpIfNonMatch,
    /// Resolve as soon as an IP condition is evaluated
    IpOnDemand,
}

impl DomainStrategy {
    /// Get the configuration name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AsIs => "AsIs",
            Self::UseIp => "UseIP",
            Self::IpIfNonMatch => "IPIfNonMatch",
            Self::IpOnDemand => "IPOnDemand",
        }
    }
}

impl FromStr for DomainStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asis" => Ok(Self::AsIs),
            "useip" => Ok(Self::UseIp),
            "ipifnonmatch" => Ok(Self::IpIfNonMatch),
            "ipondemand" => Ok(Self::IpOnDemand),
            _ => Err(ConfigError::ValidationError(format!(
                "Unknown domain strategy: {s}"
            ))),
        }
    }
}

impl TryFrom<String> for DomainStrategy {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DomainStrategy> for String {
    fn from(value: DomainStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for DomainStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Routing configuration: strategy, ordered rules, balancers
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterConfig {
    /// Domain resolution strategy
    #[serde(default)]
    pub domain_strategy: DomainStrategy,

    /// Ordered rules; the first match wins
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Balancer definitions
    #[serde(default)]
    pub balancers: Vec<BalancerConfig>,
}

impl RouterConfig {
    /// Validate the whole routing configuration
    ///
    /// Checks balancer tags, then every rule, then that every referenced
    /// balancer is defined here.
    ///
    /// # Errors
    ///
    /// Returns the first `RuleError` found.
    pub fn validate(&self) -> Result<(), RuleError> {
        let mut balancer_tags: HashSet<&str> = HashSet::new();
        for balancer in &self.balancers {
            if balancer.tag.is_empty() {
                return Err(RuleError::InvalidTarget("balancer with empty tag".into()));
            }
            if !balancer_tags.insert(&balancer.tag) {
                return Err(RuleError::DuplicateBalancerTag(balancer.tag.clone()));
            }
        }

        self.validate_rules()?;

        for rule in &self.rules {
            if let RuleTargetRef::Balancer(tag) = rule.target()? {
                if !balancer_tags.contains(tag) {
                    return Err(RuleError::BalancerNotFound(tag.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Validate, then compile every matcher and strategy name
    ///
    /// Catches what the JSON shape alone does not: bad regexes, CIDRs,
    /// ports, networks, empty selectors and unknown strategies.
    ///
    /// # Errors
    ///
    /// Returns the first `RuleError` found.
    pub fn compile_check(&self) -> Result<(), RuleError> {
        self.validate()?;

        for balancer in &self.balancers {
            if balancer.selector.iter().all(|s| s.trim().is_empty()) {
                return Err(RuleError::EmptySelector(balancer.tag.clone()));
            }
            StrategyKind::from_name(&balancer.strategy.kind)?;
        }

        for rule in &self.rules {
            Condition::build(&rule.display_name(), &rule.condition)?;
        }
        Ok(())
    }

    /// Validate rules on their own, without balancer references
    ///
    /// Used for hot-reload batches, whose balancer references are checked
    /// against the router's fixed balancer table instead.
    ///
    /// # Errors
    ///
    /// Returns the first `RuleError` found.
    pub fn validate_rules(&self) -> Result<(), RuleError> {
        let mut rule_tags: HashSet<&str> = HashSet::new();
        for rule in &self.rules {
            rule.target()?;
            if rule.condition.is_empty() {
                return Err(RuleError::EmptyCondition {
                    rule: rule.display_name(),
                });
            }
            if !rule.rule_tag.is_empty() && !rule_tags.insert(&rule.rule_tag) {
                return Err(RuleError::DuplicateRuleTag(rule.rule_tag.clone()));
            }
        }
        Ok(())
    }
}

/// Where a rule sends matching traffic, borrowed from its configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTargetRef<'a> {
    /// Fixed outbound tag
    Outbound(&'a str),
    /// Balancer tag
    Balancer(&'a str),
}

/// One routing rule
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfig {
    /// Identifier for reload/removal bookkeeping; may be empty
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rule_tag: String,

    /// Fixed outbound tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outbound_tag: Option<String>,

    /// Balancer tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub balancer_tag: Option<String>,

    /// Condition fields, combined with AND
    #[serde(flatten)]
    pub condition: ConditionConfig,
}

impl RuleConfig {
    /// Rule sending matches to a fixed outbound
    #[must_use]
    pub fn to_outbound(rule_tag: impl Into<String>, outbound: impl Into<String>) -> Self {
        Self {
            rule_tag: rule_tag.into(),
            outbound_tag: Some(outbound.into()),
            ..Self::default()
        }
    }

    /// Rule sending matches to a balancer
    #[must_use]
    pub fn to_balancer(rule_tag: impl Into<String>, balancer: impl Into<String>) -> Self {
        Self {
            rule_tag: rule_tag.into(),
            balancer_tag: Some(balancer.into()),
            ..Self::default()
        }
    }

    /// Add domain patterns
    #[must_use]
    pub fn with_domain<S: Into<String>>(mut self, patterns: impl IntoIterator<Item = S>) -> Self {
        self.condition
            .domain
            .extend(patterns.into_iter().map(Into::into));
        self
    }

    /// Add IP/CIDR entries
    #[must_use]
    pub fn with_ip<S: Into<String>>(mut self, entries: impl IntoIterator<Item = S>) -> Self {
        self.condition.ip.extend(entries.into_iter().map(Into::into));
        self
    }

    /// Set the target port list, e.g. `"53,443,1000-2000"`
    #[must_use]
    pub fn with_port(mut self, ports: impl Into<String>) -> Self {
        self.condition.port = Some(PortSpec::Text(ports.into()));
        self
    }

    /// Set the network list, e.g. `"tcp,udp"`
    #[must_use]
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.condition.network = Some(network.into());
        self
    }

    /// Add inbound tags
    #[must_use]
    pub fn with_inbound_tag<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.condition
            .inbound_tag
            .extend(tags.into_iter().map(Into::into));
        self
    }

    /// Resolve the target, enforcing exactly one of outbound or balancer
    ///
    /// Empty strings count as unset.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::MissingTarget` or `RuleError::ConflictingTarget`.
    pub fn target(&self) -> Result<RuleTargetRef<'_>, RuleError> {
        let outbound = self.outbound_tag.as_deref().filter(|t| !t.is_empty());
        let balancer = self.balancer_tag.as_deref().filter(|t| !t.is_empty());
        match (outbound, balancer) {
            (Some(tag), None) => Ok(RuleTargetRef::Outbound(tag)),
            (None, Some(tag)) => Ok(RuleTargetRef::Balancer(tag)),
            (None, None) => Err(RuleError::MissingTarget {
                rule: self.display_name(),
            }),
            (Some(_), Some(_)) => Err(RuleError::ConflictingTarget {
                rule: self.display_name(),
            }),
        }
    }

    /// Name used in error messages
    #[must_use]
    pub fn display_name(&self) -> String {
        if self.rule_tag.is_empty() {
            "<untagged>".to_string()
        } else {
            self.rule_tag.clone()
        }
    }
}

/// A port list given either as a number or as a string such as `"80,443"`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum PortSpec {
    /// Single port
    Number(u16),
    /// Comma-separated ports and ranges
    Text(String),
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(port) => write!(f, "{port}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

/// Condition fields of a rule
///
/// Every configured field must match; a rule with none is rejected.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    /// Domain patterns (`full:`, `domain:`, `keyword:`, `regexp:`, bare keyword)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub domain: Vec<String>,

    /// Target IP/CIDR entries
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip: Vec<String>,

    /// Target ports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSpec>,

    /// Source IP/CIDR entries
    #[serde(
        default,
        rename = "sourceIP",
        alias = "source",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub source_ip: Vec<String>,

    /// Source ports
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_port: Option<PortSpec>,

    /// Networks, e.g. `"tcp,udp"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,

    /// Inbound tags
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbound_tag: Vec<String>,

    /// Inbound users (email)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user: Vec<String>,

    /// Sniffed protocols
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub protocol: Vec<String>,

    /// Process names or absolute executable paths
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub process: Vec<String>,

    /// Required request attributes
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, String>,

    /// Nested condition group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logical: Option<LogicalConfig>,
}

impl ConditionConfig {
    /// Check if no condition field is configured
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domain.is_empty()
            && self.ip.is_empty()
            && self.port.is_none()
            && self.source_ip.is_empty()
            && self.source_port.is_none()
            && self.network.as_deref().map_or(true, |n| n.trim().is_empty())
            && self.inbound_tag.is_empty()
            && self.user.is_empty()
            && self.protocol.is_empty()
            && self.process.is_empty()
            && self.attrs.is_empty()
            && self.logical.is_none()
    }
}

/// Combination mode of a logical group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalMode {
    /// All children must match
    #[default]
    And,
    /// Any child may match
    Or,
}

/// Nested group of conditions
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct LogicalConfig {
    /// How children combine
    #[serde(default)]
    pub mode: LogicalMode,

    /// Child conditions
    #[serde(default)]
    pub conditions: Vec<ConditionConfig>,

    /// Negate the group result
    #[serde(default)]
    pub invert: bool,
}

/// Balancer definition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BalancerConfig {
    /// Unique balancer tag
    pub tag: String,

    /// Outbound tag prefixes
    #[serde(default)]
    pub selector: Vec<String>,

    /// Selection strategy
    #[serde(default)]
    pub strategy: StrategyConfig,
}

impl BalancerConfig {
    /// Balancer with the default strategy
    #[must_use]
    pub fn new(tag: impl Into<String>, selector: Vec<String>) -> Self {
        Self {
            tag: tag.into(),
            selector,
            strategy: StrategyConfig::default(),
        }
    }

    /// Set the strategy name
    #[must_use]
    pub fn with_strategy(mut self, name: impl Into<String>) -> Self {
        self.strategy.kind = name.into();
        self
    }

    /// Set the probe interval in seconds
    #[must_use]
    pub fn with_probe_interval_secs(mut self, secs: u64) -> Self {
        self.strategy.settings.probe_interval_secs = secs;
        self
    }
}

/// Strategy name and settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Strategy name: `random`, `roundRobin`, `leastPing`
    #[serde(rename = "type", default)]
    pub kind: String,

    /// Strategy settings
    #[serde(default)]
    pub settings: StrategySettings,
}

/// Settings used by probing strategies
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategySettings {
    /// Seconds between latency probes
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
}

impl Default for StrategySettings {
    fn default() -> Self {
        Self {
            probe_interval_secs: default_probe_interval_secs(),
        }
    }
}

impl StrategySettings {
    /// Probe interval, at least one second
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs.max(1))
    }
}

const fn default_true() -> bool {
    true
}

const fn default_probe_interval_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "json".into()
}
