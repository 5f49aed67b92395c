//! Rule building blocks for routing decisions
//!
//! This module provides:
//! - Value types for ports and networks
//! - Domain matching ([`domain`]) with Aho-Corasick automata
//! - CIDR matching ([`cidr`])
//! - The [`Condition`] tree and compiled [`Rule`]s
//!
//! # Architecture
//!
//! Rules are evaluated in list order by the router. The first rule whose
//! condition matches determines the outbound for a connection.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use routing_engine::config::RuleConfig;
//! use routing_engine::router::{MatchContext, RouteContext};
//! use routing_engine::rules::{Network, Rule};
//!
//! let config = RuleConfig::to_outbound("google", "proxy").with_domain(["domain:google.com"]);
//! let rule = Rule::build(&config, &HashMap::new()).unwrap();
//!
//! let ctx = RouteContext::new(Network::Tcp, 443).with_domain("www.google.com");
//! assert!(rule.apply(&MatchContext::new(&ctx)));
//! assert_eq!(rule.resolve_tag().unwrap(), "proxy");
//! ```

pub mod cidr;
pub mod condition;
pub mod domain;
pub mod rule;
pub mod types;

// Re-exports
pub use cidr::CidrMatcher;
pub use condition::{Condition, ProcessMatcher};
pub use domain::{DomainMatcher, DomainMatcherBuilder};
pub use rule::{Rule, RuleTarget};
pub use types::*;
