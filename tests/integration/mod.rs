//! Integration tests for routing-engine
//!
//! These tests drive the public API the way a dispatcher would: build a
//! [`Router`] from configuration, feed it connection contexts and mutate the
//! rule set at runtime.
//!
//! # Test Organization
//!
//! - `pick_route`: rule ordering, domain strategies and DNS accounting
//! - `hot_reload`: reload/remove semantics and snapshot consistency
//! - `balancer`: candidate selection, exhaustion and latency probing
//!
//! # Running Tests
//!
//! ```bash
//! cargo test --test integration_tests
//!
//! # Run specific test module
//! cargo test --test integration_tests hot_reload
//! ```

pub mod balancer;
pub mod hot_reload;
pub mod pick_route;

use std::sync::Arc;

use routing_engine::config::RouterConfig;
use routing_engine::dns::StaticDnsClient;
use routing_engine::outbound::OutboundManager;
use routing_engine::router::{ProcessLifetime, Router};

/// Registry with the outbounds most tests route to
pub fn outbounds() -> Arc<OutboundManager> {
    let manager = Arc::new(OutboundManager::new());
    for tag in ["direct", "block", "proxy-a", "proxy-b", "proxy-c"] {
        manager.add(tag);
    }
    manager
}

/// Build a router over a static DNS table, returning the table for lookup counts
pub fn build_router(config: &RouterConfig, dns: StaticDnsClient) -> (Router, Arc<StaticDnsClient>) {
    let dns = Arc::new(dns);
    let router = Router::init(config, dns.clone(), outbounds(), &ProcessLifetime::new())
        .expect("valid router config");
    (router, dns)
}
