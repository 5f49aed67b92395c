//! Outbound registry trait definitions

use std::time::Duration;

use async_trait::async_trait;

use crate::error::OutboundError;

/// Health status of an outbound
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HealthStatus {
    /// Outbound is healthy and accepting connections
    Healthy,
    /// Outbound is degraded (some failures)
    Degraded,
    /// Outbound is unhealthy (not accepting connections)
    Unhealthy,
    /// Health status is unknown
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Check if the outbound may be picked by a balancer
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded | Self::Unknown)
    }

    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
            Self::Unknown => 3,
        }
    }

    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Healthy,
            1 => Self::Degraded,
            2 => Self::Unhealthy,
            _ => Self::Unknown,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Registry of outbound handlers, as seen by balancers
///
/// `tags` is called on every balancer pick, so it should be cheap. `probe` is
/// only called from background probing tasks.
#[async_trait]
pub trait OutboundRegistry: Send + Sync {
    /// All currently registered outbound tags
    fn tags(&self) -> Vec<String>;

    /// Current health of an outbound
    fn health_status(&self, _tag: &str) -> HealthStatus {
        HealthStatus::Unknown
    }

    /// Measure the round-trip latency through an outbound
    ///
    /// # Errors
    ///
    /// Returns `OutboundError` if the outbound is missing or the probe fails.
    async fn probe(&self, tag: &str) -> Result<Duration, OutboundError>;
}
