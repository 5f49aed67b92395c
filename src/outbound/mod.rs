//! Outbound registry module
//!
//! The router never connects anywhere; it only needs to know which outbound
//! tags exist, whether each is usable, and how fast it answers. This module
//! provides:
//!
//! - [`OutboundRegistry`]: the capability balancers consume
//! - [`OutboundManager`]: a `DashMap`-backed registry the platform feeds with
//!   health and latency samples
//!
//! # Example
//!
//! ```
//! use routing_engine::outbound::{HealthStatus, OutboundManager, OutboundRegistry};
//!
//! let manager = OutboundManager::new();
//! manager.add("proxy-us-1");
//! manager.add("proxy-us-2");
//! manager.set_health("proxy-us-2", HealthStatus::Unhealthy);
//!
//! assert_eq!(manager.len(), 2);
//! assert!(!OutboundRegistry::health_status(&manager, "proxy-us-2").is_available());
//! ```

mod manager;
mod traits;

pub use manager::{OutboundHandle, OutboundManager, OutboundManagerBuilder};
pub use traits::{HealthStatus, OutboundRegistry};
