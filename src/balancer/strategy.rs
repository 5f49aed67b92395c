//! Outbound selection strategies
//!
//! | Strategy | Config name | Description |
//! |----------|-------------|-------------|
//! | `Random` | `random` | Uniform random pick (DEFAULT) |
//! | `RoundRobin` | `roundRobin` | Cycle through candidates in sorted order |
//! | `LeastPing` | `leastPing` | Lowest latency measured by background probing |

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use rand::Rng;

use crate::error::RuleError;

/// Strategy name as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrategyKind {
    /// Random selection
    #[default]
    Random,
    /// Cycle through candidates sequentially
    RoundRobin,
    /// Lowest probed latency
    LeastPing,
}

impl StrategyKind {
    /// Resolve a configured strategy name (case-insensitive)
    ///
    /// An empty name selects the default, `random`.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::UnknownStrategy` for any other name.
    ///
    /// # Example
    ///
    /// ```
    /// use routing_engine::balancer::StrategyKind;
    ///
    /// assert_eq!(StrategyKind::from_name("roundRobin").unwrap(), StrategyKind::RoundRobin);
    /// assert_eq!(StrategyKind::from_name("").unwrap(), StrategyKind::Random);
    /// assert!(StrategyKind::from_name("fastest").is_err());
    /// ```
    pub fn from_name(name: &str) -> Result<Self, RuleError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "random" => Ok(Self::Random),
            "roundrobin" | "round_robin" => Ok(Self::RoundRobin),
            "leastping" | "least_ping" => Ok(Self::LeastPing),
            _ => Err(RuleError::UnknownStrategy(name.to_string())),
        }
    }

    /// Get the configuration name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Random => "random",
            Self::RoundRobin => "roundRobin",
            Self::LeastPing => "leastPing",
        }
    }

    /// Check if this strategy relies on background probing
    #[must_use]
    pub const fn needs_probing(&self) -> bool {
        matches!(self, Self::LeastPing)
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latest probe outcome per outbound tag
///
/// `None` means the last probe failed.
type Samples = HashMap<String, Option<Duration>>;

/// A strategy together with the state it needs
#[derive(Debug)]
pub enum Strategy {
    /// Uniform random pick
    Random,
    /// Rotating counter over the sorted candidate list
    RoundRobin {
        /// Shared across concurrent picks
        counter: AtomicUsize,
    },
    /// Lowest measured latency wins
    LeastPing {
        /// Written by the prober, read on every pick
        samples: RwLock<Samples>,
    },
}

impl Strategy {
    /// Create the strategy state for a kind
    #[must_use]
    pub fn new(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Random => Self::Random,
            StrategyKind::RoundRobin => Self::RoundRobin {
                counter: AtomicUsize::new(0),
            },
            StrategyKind::LeastPing => Self::LeastPing {
                samples: RwLock::new(HashMap::new()),
            },
        }
    }

    /// Get the strategy kind
    #[must_use]
    pub const fn kind(&self) -> StrategyKind {
        match self {
            Self::Random => StrategyKind::Random,
            Self::RoundRobin { .. } => StrategyKind::RoundRobin,
            Self::LeastPing { .. } => StrategyKind::LeastPing,
        }
    }

    /// Pick one of the candidates
    ///
    /// Candidates must be sorted and non-empty for a meaningful pick.
    /// Returns `None` if nothing can be picked.
    #[must_use]
    pub fn select<'a>(&self, candidates: &'a [String]) -> Option<&'a str> {
        if candidates.is_empty() {
            return None;
        }

        match self {
            Self::Random => {
                let index = rand::thread_rng().gen_range(0..candidates.len());
                Some(candidates[index].as_str())
            }
            Self::RoundRobin { counter } => {
                let index = counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
                Some(candidates[index].as_str())
            }
            Self::LeastPing { samples } => select_least_ping(&samples.read(), candidates),
        }
    }

    /// Record a probe outcome (no-op for strategies that do not probe)
    pub fn record_probe(&self, tag: &str, latency: Option<Duration>) {
        if let Self::LeastPing { samples } = self {
            samples.write().insert(tag.to_string(), latency);
        }
    }

    /// Drop samples for tags no longer present
    pub fn retain_samples(&self, present: &[String]) {
        if let Self::LeastPing { samples } = self {
            samples.write().retain(|tag, _| present.contains(tag));
        }
    }

    /// Latest sample for a tag; outer `None` if never probed
    #[must_use]
    pub fn sample(&self, tag: &str) -> Option<Option<Duration>> {
        match self {
            Self::LeastPing { samples } => samples.read().get(tag).copied(),
            _ => None,
        }
    }
}

/// Lowest measured latency among candidates whose last probe did not fail.
///
/// Before any candidate has been measured, the first one that is not known
/// to be dead is returned.
fn select_least_ping<'a>(samples: &Samples, candidates: &'a [String]) -> Option<&'a str> {
    let alive = candidates
        .iter()
        .filter(|tag| !matches!(samples.get(tag.as_str()), Some(None)));

    let mut first_alive = None;
    let mut best: Option<(&'a str, Duration)> = None;
    for tag in alive {
        first_alive.get_or_insert(tag.as_str());
        if let Some(Some(latency)) = samples.get(tag.as_str()) {
            if best.map_or(true, |(_, b)| *latency < b) {
                best = Some((tag.as_str(), *latency));
            }
        }
    }

    best.map(|(tag, _)| tag).or(first_alive)
}
