//! Outbound Manager
//!
//! Centralized registry of outbound tags with their enabled flag, health
//! status and last latency sample. The platform's health checker writes into
//! it; balancers read from it through [`OutboundRegistry`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use super::traits::{HealthStatus, OutboundRegistry};
use crate::error::OutboundError;

/// Latency value meaning "no sample yet"
const NO_SAMPLE: u64 = 0;

/// A registered outbound
#[derive(Debug)]
pub struct OutboundHandle {
    tag: String,
    enabled: AtomicBool,
    health: AtomicU8,
    /// Last latency sample in microseconds, `NO_SAMPLE` if none
    latency_us: AtomicU64,
}

impl OutboundHandle {
    /// Create an enabled handle with unknown health
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            enabled: AtomicBool::new(true),
            health: AtomicU8::new(HealthStatus::Unknown.to_u8()),
            latency_us: AtomicU64::new(NO_SAMPLE),
        }
    }

    /// Get the tag
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Check if enabled
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enable or disable
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Current health; a disabled outbound is always unhealthy
    #[must_use]
    pub fn health_status(&self) -> HealthStatus {
        if !self.is_enabled() {
            return HealthStatus::Unhealthy;
        }
        HealthStatus::from_u8(self.health.load(Ordering::Relaxed))
    }

    /// Set the health status
    pub fn set_health(&self, status: HealthStatus) {
        self.health.store(status.to_u8(), Ordering::Relaxed);
    }

    /// Last latency sample
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        match self.latency_us.load(Ordering::Relaxed) {
            NO_SAMPLE => None,
            us => Some(Duration::from_micros(us)),
        }
    }

    /// Record a latency sample
    pub fn record_latency(&self, latency: Duration) {
        let us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX).max(1);
        self.latency_us.store(us, Ordering::Relaxed);
    }

    /// Forget the latency sample
    pub fn clear_latency(&self) {
        self.latency_us.store(NO_SAMPLE, Ordering::Relaxed);
    }
}

/// Manages all registered outbounds
pub struct OutboundManager {
    /// Map of outbound tag to handle
    outbounds: DashMap<String, Arc<OutboundHandle>>,
}

impl OutboundManager {
    /// Create a new outbound manager
    #[must_use]
    pub fn new() -> Self {
        Self {
            outbounds: DashMap::new(),
        }
    }

    /// Register an outbound by tag, replacing any previous handle
    pub fn add(&self, tag: impl Into<String>) -> Arc<OutboundHandle> {
        let handle = Arc::new(OutboundHandle::new(tag));
        self.insert(Arc::clone(&handle));
        handle
    }

    /// Register an existing handle
    pub fn insert(&self, handle: Arc<OutboundHandle>) {
        info!("Adding outbound: {}", handle.tag());
        self.outbounds.insert(handle.tag().to_string(), handle);
    }

    /// Get an outbound by tag
    #[must_use]
    pub fn get(&self, tag: &str) -> Option<Arc<OutboundHandle>> {
        self.outbounds.get(tag).map(|r| Arc::clone(r.value()))
    }

    /// Remove an outbound by tag
    pub fn remove(&self, tag: &str) -> Option<Arc<OutboundHandle>> {
        info!("Removing outbound: {}", tag);
        self.outbounds.remove(tag).map(|(_, v)| v)
    }

    /// Check if an outbound exists
    #[must_use]
    pub fn contains(&self, tag: &str) -> bool {
        self.outbounds.contains_key(tag)
    }

    /// Get all outbound tags
    #[must_use]
    pub fn tags(&self) -> Vec<String> {
        self.outbounds.iter().map(|r| r.key().clone()).collect()
    }

    /// Get the number of registered outbounds
    #[must_use]
    pub fn len(&self) -> usize {
        self.outbounds.len()
    }

    /// Check if no outbounds are registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outbounds.is_empty()
    }

    /// Enable or disable an outbound; returns false if it is not registered
    pub fn set_enabled(&self, tag: &str, enabled: bool) -> bool {
        self.get(tag).map(|h| h.set_enabled(enabled)).is_some()
    }

    /// Set the health of an outbound; returns false if it is not registered
    pub fn set_health(&self, tag: &str, status: HealthStatus) -> bool {
        self.get(tag).map(|h| h.set_health(status)).is_some()
    }

    /// Record a latency sample; returns false if it is not registered
    pub fn record_latency(&self, tag: &str, latency: Duration) -> bool {
        self.get(tag).map(|h| h.record_latency(latency)).is_some()
    }

    /// Tags of outbounds a balancer may currently pick
    #[must_use]
    pub fn available_tags(&self) -> Vec<String> {
        self.outbounds
            .iter()
            .filter(|r| r.value().health_status().is_available())
            .map(|r| r.key().clone())
            .collect()
    }

    /// Get health status of all outbounds
    #[must_use]
    pub fn health_summary(&self) -> HashMap<String, HealthStatus> {
        self.outbounds
            .iter()
            .map(|r| (r.key().clone(), r.value().health_status()))
            .collect()
    }

    /// Log current status of all outbounds
    pub fn log_status(&self) {
        for entry in &self.outbounds {
            let outbound = entry.value();
            debug!(
                "Outbound {}: enabled={} health={} latency={:?}",
                outbound.tag(),
                outbound.is_enabled(),
                outbound.health_status(),
                outbound.latency()
            );
        }
    }
}

impl Default for OutboundManager {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for OutboundManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboundManager")
            .field("count", &self.len())
            .field("tags", &self.tags())
            .finish()
    }
}

#[async_trait]
impl OutboundRegistry for OutboundManager {
    fn tags(&self) -> Vec<String> {
        Self::tags(self)
    }

    fn health_status(&self, tag: &str) -> HealthStatus {
        self.get(tag)
            .map_or(HealthStatus::Unhealthy, |h| h.health_status())
    }

    /// Reports the last latency sample recorded by the platform.
    async fn probe(&self, tag: &str) -> Result<Duration, OutboundError> {
        let handle = self.get(tag).ok_or_else(|| OutboundError::not_found(tag))?;
        if !handle.is_enabled() {
            return Err(OutboundError::unavailable(tag, "disabled"));
        }
        if handle.health_status() == HealthStatus::Unhealthy {
            return Err(OutboundError::probe_failed(tag, "outbound is unhealthy"));
        }
        handle
            .latency()
            .ok_or_else(|| OutboundError::probe_failed(tag, "no latency sample"))
    }
}

/// Builder for creating an `OutboundManager` from a list of tags
pub struct OutboundManagerBuilder {
    manager: OutboundManager,
}

impl OutboundManagerBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self {
            manager: OutboundManager::new(),
        }
    }

    /// Register one outbound
    pub fn add(&mut self, tag: impl Into<String>) -> &mut Self {
        self.manager.add(tag);
        self
    }

    /// Register several outbounds
    pub fn add_all<I, S>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            self.manager.add(tag);
        }
        self
    }

    /// Build the manager
    #[must_use]
    pub fn build(self) -> OutboundManager {
        self.manager
    }
}

impl Default for OutboundManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
