//! Compiled routing rules

use std::collections::HashMap;
use std::sync::Arc;

use crate::balancer::Balancer;
use crate::config::{RuleConfig, RuleTargetRef};
use crate::error::{RouteError, RuleError};
use crate::router::MatchContext;

use super::condition::Condition;

/// Where a matching rule sends traffic
#[derive(Debug, Clone)]
pub enum RuleTarget {
    /// Fixed outbound tag
    Outbound(String),
    /// Balancer picking among outbounds
    Balancer(Arc<Balancer>),
}

/// An immutable rule: a condition plus a target
#[derive(Debug)]
pub struct Rule {
    rule_tag: String,
    condition: Condition,
    target: RuleTarget,
}

impl Rule {
    /// Compile a rule, resolving its balancer against the balancer table
    ///
    /// # Errors
    ///
    /// Returns `RuleError` if the target is missing or ambiguous, the
    /// balancer does not exist, or the condition does not compile.
    pub fn build(
        config: &RuleConfig,
        balancers: &HashMap<String, Arc<Balancer>>,
    ) -> Result<Self, RuleError> {
        let target = match config.target()? {
            RuleTargetRef::Outbound(tag) => RuleTarget::Outbound(tag.to_string()),
            RuleTargetRef::Balancer(tag) => RuleTarget::Balancer(
                balancers
                    .get(tag)
                    .cloned()
                    .ok_or_else(|| RuleError::BalancerNotFound(tag.to_string()))?,
            ),
        };
        let condition = Condition::build(&config.display_name(), &config.condition)?;

        Ok(Self {
            rule_tag: config.rule_tag.clone(),
            condition,
            target,
        })
    }

    /// Rule tag, empty if none was configured
    #[must_use]
    pub fn rule_tag(&self) -> &str {
        &self.rule_tag
    }

    /// The compiled condition
    #[must_use]
    pub const fn condition(&self) -> &Condition {
        &self.condition
    }

    /// The target
    #[must_use]
    pub const fn target(&self) -> &RuleTarget {
        &self.target
    }

    /// Balancer tag, if the target is a balancer
    #[must_use]
    pub fn balancer_tag(&self) -> Option<&str> {
        match &self.target {
            RuleTarget::Balancer(balancer) => Some(balancer.tag()),
            RuleTarget::Outbound(_) => None,
        }
    }

    /// Check whether the connection matches
    #[must_use]
    pub fn apply(&self, view: &MatchContext<'_>) -> bool {
        self.condition.matches(view)
    }

    /// Outbound tag for a matched connection
    ///
    /// # Errors
    ///
    /// Returns `RouteError::BalancerExhausted` if the balancer has no
    /// candidate.
    pub fn resolve_tag(&self) -> Result<String, RouteError> {
        match &self.target {
            RuleTarget::Outbound(tag) => Ok(tag.clone()),
            RuleTarget::Balancer(balancer) => balancer.pick_outbound(),
        }
    }
}
