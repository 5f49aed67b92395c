//! routing-engine: rule-based outbound selection for proxy dispatchers
//!
//! This crate decides which outbound a proxied connection should use. It is
//! the routing core of a dispatcher: the dispatcher describes each
//! connection with a [`RouteContext`], the [`Router`] evaluates its ordered
//! rules and answers with an outbound tag.
//!
//! # Features
//!
//! - **Rule Conditions**: domain (full, subdomain, keyword, regex), CIDR,
//!   ports, network, inbound tag, user, protocol, process, attributes and
//!   nested logical conditions
//! - **Domain Strategies**: `AsIs`, `UseIP`, `IPIfNonMatch` (retry after
//!   DNS) and `IPOnDemand` (resolve lazily on the first IP condition)
//! - **Balancers**: random, round-robin and least-ping selection over a
//!   dynamic outbound group
//! - **Hot Reload**: append or remove rules at runtime; readers never block
//!
//! # Architecture
//!
//! ```text
//! Dispatcher -> RouteContext -> Router -> Rule (Condition) -> tag | Balancer
//!                                  |                               |
//!                              DnsClient                    OutboundRegistry
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use routing_engine::config::load_config;
//! use routing_engine::dns::SystemDnsClient;
//! use routing_engine::outbound::OutboundManagerBuilder;
//! use routing_engine::router::{ProcessLifetime, RouteContext, Router};
//! use routing_engine::rules::Network;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("/etc/routing-engine/config.json")?;
//!
//! let mut builder = OutboundManagerBuilder::new();
//! builder.add_all(&config.outbounds);
//! let outbounds = Arc::new(builder.build());
//!
//! let lifetime = ProcessLifetime::new();
//! let router = Router::init(
//!     &config.routing,
//!     Arc::new(SystemDnsClient::new()),
//!     outbounds,
//!     &lifetime,
//! )?;
//!
//! let ctx = RouteContext::new(Network::Tcp, 443).with_domain("www.google.com");
//! if let Some(route) = router.pick_route(&ctx)? {
//!     println!("-> {}", route.outbound_tag());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`balancer`]: Outbound groups and selection strategies
//! - [`config`]: Configuration types and loading
//! - [`dns`]: DNS capability and adapters
//! - [`error`]: Error types
//! - [`outbound`]: Outbound registry and health tracking
//! - [`router`]: Route picking and hot reload
//! - [`rules`]: Matchers, conditions and compiled rules

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod balancer;
pub mod config;
pub mod dns;
pub mod error;
pub mod outbound;
pub mod router;
pub mod rules;

// Re-export commonly used types at the crate root
pub use balancer::{Balancer, StrategyKind};
pub use config::{Config, DomainStrategy, RouterConfig, RuleConfig};
pub use dns::DnsClient;
pub use error::{ConfigError, DnsError, OutboundError, RouteError, RouterError, RuleError};
pub use outbound::{HealthStatus, OutboundManager, OutboundRegistry};
pub use router::{Decision, Dispatcher, ProcessLifetime, Route, RouteContext, Router};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
