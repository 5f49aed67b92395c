//! Balancers: pick one outbound out of a dynamic candidate group
//!
//! A [`Balancer`] is built once at router init from a [`BalancerConfig`]. On
//! every pick it intersects its selector prefixes with the outbound tags the
//! registry currently holds, drops unavailable outbounds, sorts what is left
//! and hands it to its [`Strategy`].
//!
//! Strategies that need latency data (`leastPing`) run a background prober
//! started by [`Balancer::inject_context`] and stopped when the injected
//! cancellation token fires.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use routing_engine::balancer::Balancer;
//! use routing_engine::config::BalancerConfig;
//! use routing_engine::outbound::OutboundManager;
//!
//! let manager = Arc::new(OutboundManager::new());
//! manager.add("us-1");
//! manager.add("us-2");
//! manager.add("jp-1");
//!
//! let config = BalancerConfig::new("us", vec!["us-".into()]).with_strategy("roundRobin");
//! let balancer = Balancer::build(&config, manager).unwrap();
//!
//! assert_eq!(balancer.candidates(), vec!["us-1", "us-2"]);
//! assert_eq!(balancer.pick_outbound().unwrap(), "us-1");
//! assert_eq!(balancer.pick_outbound().unwrap(), "us-2");
//! ```

mod strategy;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::BalancerConfig;
use crate::error::{RouteError, RuleError};
use crate::outbound::OutboundRegistry;

pub use strategy::{Strategy, StrategyKind};

/// Named group of outbounds with a selection strategy
pub struct Balancer {
    tag: String,
    selectors: Vec<String>,
    strategy: Strategy,
    registry: Arc<dyn OutboundRegistry>,
    probe_interval: Duration,
}

impl Balancer {
    /// Build a balancer from configuration
    ///
    /// # Errors
    ///
    /// Returns `RuleError::EmptySelector` if no non-empty selector is given,
    /// `RuleError::UnknownStrategy` for an unknown strategy name, and
    /// `RuleError::InvalidTarget` for an empty tag.
    pub fn build(
        config: &BalancerConfig,
        registry: Arc<dyn OutboundRegistry>,
    ) -> Result<Self, RuleError> {
        if config.tag.is_empty() {
            return Err(RuleError::InvalidTarget("balancer with empty tag".into()));
        }

        let selectors: Vec<String> = config
            .selector
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if selectors.is_empty() {
            return Err(RuleError::EmptySelector(config.tag.clone()));
        }

        let kind = StrategyKind::from_name(&config.strategy.kind)?;

        Ok(Self {
            tag: config.tag.clone(),
            selectors,
            strategy: Strategy::new(kind),
            registry,
            probe_interval: config.strategy.settings.probe_interval(),
        })
    }

    /// Get the balancer tag
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Get the selector prefixes
    #[must_use]
    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }

    /// Get the strategy
    #[must_use]
    pub const fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    /// Registered outbound tags matching any selector prefix, sorted
    fn selected_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .registry
            .tags()
            .into_iter()
            .filter(|tag| self.selectors.iter().any(|s| tag.starts_with(s.as_str())))
            .collect();
        tags.sort_unstable();
        tags.dedup();
        tags
    }

    /// Current candidate set: selected tags that are available, sorted
    #[must_use]
    pub fn candidates(&self) -> Vec<String> {
        let mut tags = self.selected_tags();
        tags.retain(|tag| self.registry.health_status(tag).is_available());
        tags
    }

    /// Pick an outbound tag for one connection
    ///
    /// # Errors
    ///
    /// Returns `RouteError::BalancerExhausted` when no candidate is left.
    pub fn pick_outbound(&self) -> Result<String, RouteError> {
        let candidates = self.candidates();
        match self.strategy.select(&candidates) {
            Some(tag) => {
                trace!(
                    balancer = %self.tag,
                    strategy = %self.strategy.kind(),
                    outbound = tag,
                    candidates = candidates.len(),
                    "Balancer picked outbound"
                );
                Ok(tag.to_string())
            }
            None => {
                debug!(balancer = %self.tag, "Balancer exhausted");
                Err(RouteError::exhausted(&self.tag))
            }
        }
    }

    /// Attach the process lifetime token and start background probing.
    ///
    /// Returns the prober task handle for strategies that probe, `None`
    /// otherwise. Probing needs a Tokio runtime; without one it is skipped
    /// with a warning and `leastPing` picks the first live candidate.
    pub fn inject_context(self: &Arc<Self>, token: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.strategy.kind().needs_probing() {
            return None;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(balancer = %self.tag, "No async runtime, latency probing disabled");
            return None;
        };

        let balancer = Arc::clone(self);
        debug!(
            balancer = %self.tag,
            interval = ?self.probe_interval,
            "Starting latency prober"
        );
        Some(runtime.spawn(async move {
            let mut ticker = tokio::time::interval(balancer.probe_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                // A round can outlast the interval; cancellation cuts it short.
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = balancer.probe_candidates() => {}
                }
            }
            debug!(balancer = %balancer.tag, "Latency prober stopped");
        }))
    }

    /// Probe every selected outbound once and record the outcome
    pub async fn probe_candidates(&self) {
        let tags = self.selected_tags();
        for tag in &tags {
            match self.registry.probe(tag).await {
                Ok(latency) => {
                    trace!(balancer = %self.tag, outbound = %tag, ?latency, "Probe ok");
                    self.strategy.record_probe(tag, Some(latency));
                }
                Err(e) => {
                    warn!(balancer = %self.tag, outbound = %tag, error = %e, "Probe failed");
                    self.strategy.record_probe(tag, None);
                }
            }
        }
        self.strategy.retain_samples(&tags);
    }
}

impl std::fmt::Debug for Balancer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Balancer")
            .field("tag", &self.tag)
            .field("selectors", &self.selectors)
            .field("strategy", &self.strategy.kind())
            .field("probe_interval", &self.probe_interval)
            .finish()
    }
}
