//! Rule conditions
//!
//! A [`Condition`] is a closed tree of predicates over a connection. It is
//! built once from a [`ConditionConfig`] and evaluated by a recursive match;
//! evaluation never mutates the condition.
//!
//! A rule's configured fields become the children of one `And` node. IP
//! conditions are placed last so that a cheaper failing field short-circuits
//! before any DNS lookup can be triggered.

use std::collections::HashSet;

use crate::config::{ConditionConfig, LogicalConfig, LogicalMode};
use crate::error::RuleError;
use crate::router::MatchContext;

use super::cidr::CidrMatcher;
use super::domain::DomainMatcher;
use super::types::{NetworkList, PortList};

/// Predicate over a connection's routing context
#[derive(Debug)]
pub enum Condition {
    /// Target domain matches any pattern
    Domain(DomainMatcher),
    /// Any target IP (pre-supplied or resolved) is in the set
    Cidr(CidrMatcher),
    /// Source IP is in the set
    SourceCidr(CidrMatcher),
    /// Target port is in the list
    Port(PortList),
    /// Source port is in the list
    SourcePort(PortList),
    /// Connection network is accepted
    Network(NetworkList),
    /// Inbound tag is one of these
    InboundTag(HashSet<String>),
    /// Inbound user is one of these
    User(HashSet<String>),
    /// Sniffed protocol is one of these (lowercase)
    Protocol(HashSet<String>),
    /// Originating process matches
    Process(ProcessMatcher),
    /// Every attribute is present with an equal value
    Attribute(Vec<(String, String)>),
    /// All children match
    And(Vec<Condition>),
    /// Any child matches
    Or(Vec<Condition>),
    /// Child does not match
    Not(Box<Condition>),
}

impl Condition {
    /// Build the condition of one rule
    ///
    /// # Errors
    ///
    /// Returns `RuleError::EmptyCondition` if no field is configured, or the
    /// error of the first field that fails to compile.
    pub fn build(rule: &str, config: &ConditionConfig) -> Result<Self, RuleError> {
        let mut parts = Vec::new();

        if !config.domain.is_empty() {
            parts.push(Self::Domain(DomainMatcher::from_patterns(&config.domain)?));
        }
        if let Some(port) = &config.port {
            parts.push(Self::Port(PortList::parse(&port.to_string())?));
        }
        if let Some(port) = &config.source_port {
            parts.push(Self::SourcePort(PortList::parse(&port.to_string())?));
        }
        if let Some(network) = config.network.as_deref().filter(|n| !n.trim().is_empty()) {
            parts.push(Self::Network(NetworkList::parse(network)?));
        }
        if !config.source_ip.is_empty() {
            parts.push(Self::SourceCidr(CidrMatcher::from_entries(&config.source_ip)?));
        }
        if !config.inbound_tag.is_empty() {
            parts.push(Self::InboundTag(config.inbound_tag.iter().cloned().collect()));
        }
        if !config.user.is_empty() {
            parts.push(Self::User(config.user.iter().cloned().collect()));
        }
        if !config.protocol.is_empty() {
            parts.push(Self::Protocol(
                config.protocol.iter().map(|p| p.to_ascii_lowercase()).collect(),
            ));
        }
        if !config.process.is_empty() {
            parts.push(Self::Process(ProcessMatcher::new(&config.process)));
        }
        if !config.attrs.is_empty() {
            let mut attrs: Vec<(String, String)> = config
                .attrs
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect();
            attrs.sort();
            parts.push(Self::Attribute(attrs));
        }
        if let Some(logical) = &config.logical {
            parts.push(Self::build_logical(rule, logical)?);
        }
        if !config.ip.is_empty() {
            parts.push(Self::Cidr(CidrMatcher::from_entries(&config.ip)?));
        }

        match parts.len() {
            0 => Err(RuleError::EmptyCondition {
                rule: rule.to_string(),
            }),
            1 => Ok(parts.remove(0)),
            _ => Ok(Self::And(parts)),
        }
    }

    fn build_logical(rule: &str, config: &LogicalConfig) -> Result<Self, RuleError> {
        if config.conditions.is_empty() {
            return Err(RuleError::EmptyCondition {
                rule: rule.to_string(),
            });
        }

        let children = config
            .conditions
            .iter()
            .map(|child| Self::build(rule, child))
            .collect::<Result<Vec<_>, _>>()?;

        let group = match config.mode {
            LogicalMode::And => Self::And(children),
            LogicalMode::Or => Self::Or(children),
        };

        Ok(if config.invert {
            Self::Not(Box::new(group))
        } else {
            group
        })
    }

    /// Evaluate against a connection
    ///
    /// Fields the connection does not carry never match. IP conditions only
    /// see IPs the context can provide; see [`MatchContext::target_ips`].
    #[must_use]
    pub fn matches(&self, view: &MatchContext<'_>) -> bool {
        let ctx = view.context();
        match self {
            Self::Domain(matcher) => ctx.domain().is_some_and(|d| matcher.matches(d)),
            Self::Cidr(matcher) => matcher.contains_any(view.target_ips()),
            Self::SourceCidr(matcher) => ctx.source_ip.is_some_and(|ip| matcher.contains(ip)),
            Self::Port(ports) => ports.contains(ctx.target_port),
            Self::SourcePort(ports) => ports.contains(ctx.source_port),
            Self::Network(networks) => networks.contains(ctx.network),
            Self::InboundTag(tags) => ctx.inbound_tag.as_ref().is_some_and(|t| tags.contains(t)),
            Self::User(users) => ctx.user.as_ref().is_some_and(|u| users.contains(u)),
            Self::Protocol(protocols) => ctx
                .protocol
                .as_ref()
                .is_some_and(|p| protocols.contains(&p.to_ascii_lowercase())),
            Self::Process(matcher) => {
                matcher.matches(ctx.process_name.as_deref(), ctx.process_path.as_deref())
            }
            Self::Attribute(attrs) => attrs
                .iter()
                .all(|(key, value)| ctx.attribute(key) == Some(value.as_str())),
            Self::And(children) => children.iter().all(|c| c.matches(view)),
            Self::Or(children) => children.iter().any(|c| c.matches(view)),
            Self::Not(child) => !child.matches(view),
        }
    }
}

/// Matches the originating process by name or by executable path
///
/// Entries containing a path separator are compared with the full path;
/// anything else with the process name.
#[derive(Debug, Clone, Default)]
pub struct ProcessMatcher {
    names: HashSet<String>,
    paths: HashSet<String>,
}

impl ProcessMatcher {
    /// Build from configured entries
    #[must_use]
    pub fn new<S: AsRef<str>>(entries: &[S]) -> Self {
        let mut matcher = Self::default();
        for entry in entries.iter().map(|e| e.as_ref().trim()).filter(|e| !e.is_empty()) {
            if entry.contains('/') || entry.contains('\\') {
                matcher.paths.insert(entry.to_string());
            } else {
                matcher.names.insert(entry.to_string());
            }
        }
        matcher
    }

    /// Check a process by name and optional path
    #[must_use]
    pub fn matches(&self, name: Option<&str>, path: Option<&str>) -> bool {
        name.is_some_and(|n| self.names.contains(n)) || path.is_some_and(|p| self.paths.contains(p))
    }
}
