//! Routing results

use std::fmt;
use std::net::IpAddr;

/// Result of a successful rule match
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    outbound_tag: String,
    outbound_group_tags: Vec<String>,
    rule_tag: Option<String>,
    resolved_ips: Option<Vec<IpAddr>>,
}

impl Route {
    pub(crate) fn new(
        outbound_tag: String,
        balancer_tag: Option<&str>,
        rule_tag: &str,
        resolved_ips: Option<Vec<IpAddr>>,
    ) -> Self {
        Self {
            outbound_tag,
            outbound_group_tags: balancer_tag.map(|t| vec![t.to_string()]).unwrap_or_default(),
            rule_tag: (!rule_tag.is_empty()).then(|| rule_tag.to_string()),
            resolved_ips,
        }
    }

    /// Outbound the connection should use
    #[must_use]
    pub fn outbound_tag(&self) -> &str {
        &self.outbound_tag
    }

    /// Balancer tags the outbound was chosen through, for diagnostics
    #[must_use]
    pub fn outbound_group_tags(&self) -> &[String] {
        &self.outbound_group_tags
    }

    /// Tag of the matching rule, if it had one
    #[must_use]
    pub fn rule_tag(&self) -> Option<&str> {
        self.rule_tag.as_deref()
    }

    /// Addresses resolved for the target domain while routing, if any
    #[must_use]
    pub fn resolved_ips(&self) -> Option<&[IpAddr]> {
        self.resolved_ips.as_deref()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.outbound_tag)?;
        if let Some(group) = self.outbound_group_tags.first() {
            write!(f, " (via {group})")?;
        }
        if let Some(rule) = &self.rule_tag {
            write!(f, " [rule {rule}]")?;
        }
        Ok(())
    }
}

/// A route pick together with how it was reached
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Matched route, `None` when no rule matched
    pub route: Option<Route>,

    /// Number of passes over the rule list (1, or 2 after a DNS retry)
    pub passes: u8,

    /// Total rule evaluations across all passes
    pub rules_evaluated: usize,

    /// Version of the rule snapshot the decision was made against
    pub version: u64,
}

impl Decision {
    /// Check whether a rule matched
    #[must_use]
    pub const fn is_match(&self) -> bool {
        self.route.is_some()
    }
}
