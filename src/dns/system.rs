//! Platform resolver adapter

use std::net::{IpAddr, ToSocketAddrs};

use tracing::trace;

use super::DnsClient;
use crate::error::DnsError;

/// DNS client backed by the operating system resolver (`getaddrinfo`)
///
/// Lookups block the calling thread for as long as the system resolver
/// takes; its own timeout configuration applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemDnsClient;

impl SystemDnsClient {
    /// Create a new system resolver client
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl DnsClient for SystemDnsClient {
    fn lookup_ip(&self, domain: &str) -> Result<Vec<IpAddr>, DnsError> {
        let addrs = (domain, 0)
            .to_socket_addrs()
            .map_err(|e| DnsError::failed(domain, e.to_string()))?;

        let mut ips: Vec<IpAddr> = Vec::new();
        for addr in addrs {
            if !ips.contains(&addr.ip()) {
                ips.push(addr.ip());
            }
        }
        trace!(domain, count = ips.len(), "System resolver answered");

        if ips.is_empty() {
            return Err(DnsError::not_found(domain));
        }
        Ok(ips)
    }
}
