//! DNS capability consumed by the router
//!
//! The router never performs resolution on its own. It is handed a
//! [`DnsClient`] at init and calls it at most once per `pick_route` when the
//! domain strategy allows IP-based matching of a domain target.
//!
//! Two adapters are provided:
//!
//! - [`StaticDnsClient`]: in-memory host table with a lookup counter
//! - [`SystemDnsClient`]: the platform resolver (blocking)

mod static_client;
mod system;

use std::fmt::Debug;
use std::net::IpAddr;

use crate::error::DnsError;

pub use static_client::StaticDnsClient;
pub use system::SystemDnsClient;

/// Synchronous DNS lookup capability
///
/// Calls block the routing caller, so implementations are responsible for
/// bounding their own latency.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one client is shared by every
/// concurrent `pick_route` call.
pub trait DnsClient: Send + Sync + Debug {
    /// Resolve a domain to its IP addresses
    ///
    /// # Errors
    ///
    /// Returns `DnsError` if the domain cannot be resolved.
    fn lookup_ip(&self, domain: &str) -> Result<Vec<IpAddr>, DnsError>;
}
