//! In-memory DNS client

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use super::DnsClient;
use crate::error::DnsError;

/// DNS client answering from a fixed host table
///
/// Domains are matched case-insensitively. Every call to
/// [`DnsClient::lookup_ip`] is counted, hit or miss.
///
/// # Example
///
/// ```
/// use routing_engine::dns::{DnsClient, StaticDnsClient};
///
/// let dns = StaticDnsClient::new().with_host("internal.example", "10.1.2.3".parse().unwrap());
///
/// assert_eq!(dns.lookup_ip("internal.example").unwrap().len(), 1);
/// assert!(dns.lookup_ip("other.example").is_err());
/// assert_eq!(dns.lookup_count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct StaticDnsClient {
    hosts: RwLock<HashMap<String, Vec<IpAddr>>>,
    lookups: AtomicU64,
}

impl StaticDnsClient {
    /// Create an empty host table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an address for a domain
    #[must_use]
    pub fn with_host(self, domain: &str, ip: IpAddr) -> Self {
        self.insert(domain, ip);
        self
    }

    /// Add an address for a domain in place
    pub fn insert(&self, domain: &str, ip: IpAddr) {
        self.hosts
            .write()
            .entry(normalize(domain))
            .or_default()
            .push(ip);
    }

    /// Remove every address of a domain
    pub fn remove(&self, domain: &str) -> bool {
        self.hosts.write().remove(&normalize(domain)).is_some()
    }

    /// Number of lookups served so far
    #[must_use]
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of domains in the table
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    /// Check if the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }
}

impl DnsClient for StaticDnsClient {
    fn lookup_ip(&self, domain: &str) -> Result<Vec<IpAddr>, DnsError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.hosts
            .read()
            .get(&normalize(domain))
            .filter(|ips| !ips.is_empty())
            .cloned()
            .ok_or_else(|| DnsError::not_found(domain))
    }
}

fn normalize(domain: &str) -> String {
    domain.trim_end_matches('.').to_ascii_lowercase()
}
