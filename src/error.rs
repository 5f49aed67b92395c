//! Error types for routing-engine
//!
//! This module defines the error hierarchy for the routing core.
//! Errors are grouped by subsystem and carry recovery hints so the
//! dispatcher can decide whether a failed decision is worth retrying.

use std::io;

use thiserror::Error;

/// Top-level error type for routing-engine
#[derive(Debug, Error)]
pub enum RouterError {
    /// Configuration errors (file parsing, validation)
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rule or balancer build errors
    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),

    /// Per-connection route selection errors
    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    /// DNS capability errors
    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),

    /// Outbound registry errors
    #[error("Outbound error: {0}")]
    Outbound(#[from] OutboundError),

    /// I/O errors not covered by other categories
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl RouterError {
    /// Check if this error is recoverable (can retry operation)
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Rule(_) => false,
            Self::Route(e) => e.is_recoverable(),
            Self::Dns(e) => e.is_recoverable(),
            Self::Outbound(e) => e.is_recoverable(),
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock
            ),
        }
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File not found or inaccessible
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Validation error (invalid values, missing required fields)
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),

    /// Environment variable error
    #[error("Environment variable error: {name}: {reason}")]
    EnvError { name: String, reason: String },

    /// I/O error while reading config
    #[error("I/O error reading configuration: {0}")]
    IoError(#[from] io::Error),
}

impl ConfigError {
    /// Config errors are not recoverable without user intervention
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Errors raised while building or mutating the rule set
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// Rule has no condition fields configured
    #[error("Rule {rule} has no conditions")]
    EmptyCondition { rule: String },

    /// Rule sets neither an outbound tag nor a balancer tag
    #[error("Rule {rule} has neither outboundTag nor balancerTag")]
    MissingTarget { rule: String },

    /// Rule sets both an outbound tag and a balancer tag
    #[error("Rule {rule} sets both outboundTag and balancerTag")]
    ConflictingTarget { rule: String },

    /// Rule tag collides with an active rule or another rule in the batch
    #[error("Duplicate ruleTag: {0}")]
    DuplicateRuleTag(String),

    /// Rule references a balancer that is not in the balancer table
    #[error("Balancer {0} not found")]
    BalancerNotFound(String),

    /// Balancer tag defined twice
    #[error("Duplicate balancer tag: {0}")]
    DuplicateBalancerTag(String),

    /// Balancer has no selector patterns
    #[error("Balancer {0} has no selectors")]
    EmptySelector(String),

    /// Unknown balancing strategy name
    #[error("Unknown balancing strategy: {0}")]
    UnknownStrategy(String),

    /// Invalid regex pattern
    #[error("Invalid regex pattern: {0}")]
    InvalidRegex(String),

    /// Invalid CIDR or IP address
    #[error("Invalid IP or CIDR: {0}")]
    InvalidCidr(String),

    /// Invalid port range (start > end)
    #[error("Invalid port range: {start}-{end}")]
    InvalidPortRange { start: u16, end: u16 },

    /// Invalid target value (unparsable port, empty pattern, etc.)
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    /// Unknown network name
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Empty rule tag passed to a removal call
    #[error("Empty rule tag")]
    EmptyTag,

    /// Matcher compilation failed
    #[error("Compilation error: {0}")]
    CompilationError(String),
}

impl RuleError {
    /// Rule errors describe bad input and never succeed on retry
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        false
    }
}

/// Errors produced while picking a route for a connection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    /// Matched balancer had no live candidate outbound
    #[error("Balancer {tag} exhausted: no live outbound matches its selectors")]
    BalancerExhausted { tag: String },
}

impl RouteError {
    /// An exhausted balancer may recover once outbounds come back
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::BalancerExhausted { .. } => true,
        }
    }

    /// Create a balancer exhausted error
    pub fn exhausted(tag: impl Into<String>) -> Self {
        Self::BalancerExhausted { tag: tag.into() }
    }
}

/// Errors reported by a DNS capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnsError {
    /// Domain has no address records
    #[error("No records for {domain}")]
    NotFound { domain: String },

    /// Lookup exceeded the resolver's own deadline
    #[error("Lookup for {domain} timed out")]
    Timeout { domain: String },

    /// Any other resolver failure
    #[error("Lookup for {domain} failed: {reason}")]
    Failed { domain: String, reason: String },
}

impl DnsError {
    /// Check if this error is recoverable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::NotFound { .. } => false,
            Self::Timeout { .. } | Self::Failed { .. } => true,
        }
    }

    /// Create a not found error
    pub fn not_found(domain: impl Into<String>) -> Self {
        Self::NotFound {
            domain: domain.into(),
        }
    }

    /// Create a generic failure
    pub fn failed(domain: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            domain: domain.into(),
            reason: reason.into(),
        }
    }
}

/// Outbound registry errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OutboundError {
    /// Outbound not found
    #[error("Outbound not found: {tag}")]
    NotFound { tag: String },

    /// Outbound is disabled or unhealthy
    #[error("Outbound {tag} is unavailable: {reason}")]
    Unavailable { tag: String, reason: String },

    /// Latency probe failed
    #[error("Probe of outbound {tag} failed: {reason}")]
    ProbeFailed { tag: String, reason: String },
}

impl OutboundError {
    /// Check if this error is recoverable
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::NotFound { .. } => false,
            Self::Unavailable { .. } | Self::ProbeFailed { .. } => true,
        }
    }

    /// Create a not found error
    pub fn not_found(tag: impl Into<String>) -> Self {
        Self::NotFound { tag: tag.into() }
    }

    /// Create an unavailable error
    pub fn unavailable(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            tag: tag.into(),
            reason: reason.into(),
        }
    }

    /// Create a probe failure
    pub fn probe_failed(tag: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            tag: tag.into(),
            reason: reason.into(),
        }
    }
}

/// Type alias for Result with `RouterError`
pub type Result<T> = std::result::Result<T, RouterError>;
