//! CIDR matcher for IP-based routing conditions
//!
//! Entries are CIDR blocks (`10.0.0.0/8`, `fd00::/8`) or bare addresses, which
//! become host routes (`/32` or `/128`). The built-in `geoip:private` list
//! expands to the reserved private and local ranges; other `geoip:` country
//! lists need external data and are rejected.
//!
//! # Example
//!
//! ```
//! use routing_engine::rules::cidr::CidrMatcher;
//! use std::net::IpAddr;
//!
//! let matcher = CidrMatcher::from_entries(&["10.0.0.0/8", "1.1.1.1"]).unwrap();
//!
//! let ip: IpAddr = "10.1.2.3".parse().unwrap();
//! assert!(matcher.contains(ip));
//! assert!(matcher.contains("1.1.1.1".parse().unwrap()));
//! assert!(!matcher.contains("8.8.8.8".parse().unwrap()));
//! ```

use std::net::IpAddr;

use ipnet::IpNet;

use crate::error::RuleError;

/// Ranges covered by `geoip:private`
const PRIVATE_RANGES: &[&str] = &[
    "0.0.0.0/8",
    "10.0.0.0/8",
    "100.64.0.0/10",
    "127.0.0.0/8",
    "169.254.0.0/16",
    "172.16.0.0/12",
    "192.0.0.0/24",
    "192.168.0.0/16",
    "198.18.0.0/15",
    "224.0.0.0/4",
    "240.0.0.0/4",
    "255.255.255.255/32",
    "::1/128",
    "fc00::/7",
    "fe80::/10",
    "ff00::/8",
];

/// Set of IP networks; an address matches if any network contains it
#[derive(Debug, Clone, Default)]
pub struct CidrMatcher {
    networks: Vec<IpNet>,
}

impl CidrMatcher {
    /// Build from configured entries
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidCidr` for entries that are neither a CIDR
    /// block nor an IP address, and `RuleError::InvalidTarget` for
    /// unsupported `geoip:` lists.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Result<Self, RuleError> {
        let mut networks = Vec::with_capacity(entries.len());
        for entry in entries {
            push_entry(&mut networks, entry.as_ref())?;
        }
        Ok(Self { networks })
    }

    /// Check a single address
    #[must_use]
    pub fn contains(&self, ip: IpAddr) -> bool {
        let ip = canonical(ip);
        self.networks.iter().any(|net| net.contains(&ip))
    }

    /// Check if any of the addresses is covered
    #[must_use]
    pub fn contains_any(&self, ips: &[IpAddr]) -> bool {
        ips.iter().any(|ip| self.contains(*ip))
    }

    /// Number of networks
    #[must_use]
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// Check if the matcher has no networks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }
}

fn push_entry(networks: &mut Vec<IpNet>, entry: &str) -> Result<(), RuleError> {
    let entry = entry.trim();

    if let Some(list) = entry.strip_prefix("geoip:") {
        if list.eq_ignore_ascii_case("private") {
            for range in PRIVATE_RANGES {
                networks.push(parse_network(range)?);
            }
            return Ok(());
        }
        return Err(RuleError::InvalidTarget(format!(
            "external geoip lists are not supported: {entry}"
        )));
    }

    networks.push(parse_network(entry)?);
    Ok(())
}

fn parse_network(entry: &str) -> Result<IpNet, RuleError> {
    if let Ok(net) = entry.parse::<IpNet>() {
        return Ok(net.trunc());
    }
    let invalid = || RuleError::InvalidCidr(entry.to_string());
    let addr = entry.parse::<IpAddr>().map_err(|_| invalid())?;
    let prefix = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, prefix).map_err(|_| invalid())
}

/// IPv4-mapped IPv6 addresses are matched as IPv4
fn canonical(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(IpAddr::V6(v6), IpAddr::V4),
        v4 => v4,
    }
}
