//! Core value types shared by rule conditions
//!
//! - [`PortRange`] / [`PortList`]: port-based matching
//! - [`Network`]: transport network of a connection
//! - [`NetworkList`]: set of accepted networks

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RuleError;

/// A range of ports for port-based matching
///
/// Supports both single ports and ranges (e.g., "80" or "80-443").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    /// Start of the range (inclusive)
    pub start: u16,
    /// End of the range (inclusive)
    pub end: u16,
}

impl PortRange {
    /// Create a new port range
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPortRange` if start > end.
    ///
    /// # Examples
    ///
    /// ```
    /// use routing_engine::rules::PortRange;
    ///
    /// let range = PortRange::new(80, 443).unwrap();
    /// assert!(range.contains(80));
    /// assert!(range.contains(443));
    /// assert!(!range.contains(8080));
    /// ```
    pub fn new(start: u16, end: u16) -> Result<Self, RuleError> {
        if start > end {
            return Err(RuleError::InvalidPortRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Create a range for a single port
    #[must_use]
    pub const fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// Check if a port is within this range
    #[must_use]
    pub const fn contains(&self, port: u16) -> bool {
        port >= self.start && port <= self.end
    }

    /// Parse a port range from a string
    ///
    /// Accepts "80" and "80-443".
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidTarget` if a bound is not a port number and
    /// `RuleError::InvalidPortRange` if start > end.
    ///
    /// # Examples
    ///
    /// ```
    /// use routing_engine::rules::PortRange;
    ///
    /// let range = PortRange::parse("80-443").unwrap();
    /// assert_eq!((range.start, range.end), (80, 443));
    /// assert!(PortRange::parse("443-80").is_err());
    /// ```
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        let s = s.trim();

        if let Some((start_str, end_str)) = s.split_once('-') {
            let start = parse_port(start_str)?;
            let end = parse_port(end_str)?;
            Self::new(start, end)
        } else {
            Ok(Self::single(parse_port(s)?))
        }
    }

    /// Check if this range represents a single port
    #[must_use]
    pub const fn is_single(&self) -> bool {
        self.start == self.end
    }
}

fn parse_port(s: &str) -> Result<u16, RuleError> {
    s.trim()
        .parse::<u16>()
        .map_err(|_| RuleError::InvalidTarget(format!("invalid port number: {s}")))
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Ordered list of port ranges; a port matches if any range contains it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PortList {
    ranges: Vec<PortRange>,
}

impl PortList {
    /// Build from explicit ranges
    #[must_use]
    pub fn new(ranges: Vec<PortRange>) -> Self {
        Self { ranges }
    }

    /// Parse a comma-separated list such as `"53,443,1000-2000"`
    ///
    /// # Errors
    ///
    /// Returns `RuleError` if any entry is malformed or the list is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use routing_engine::rules::PortList;
    ///
    /// let ports = PortList::parse("53, 443, 8000-8080").unwrap();
    /// assert!(ports.contains(53));
    /// assert!(ports.contains(8042));
    /// assert!(!ports.contains(80));
    /// ```
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        let ranges = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(PortRange::parse)
            .collect::<Result<Vec<_>, _>>()?;

        if ranges.is_empty() {
            return Err(RuleError::InvalidTarget(format!("empty port list: {s:?}")));
        }
        Ok(Self { ranges })
    }

    /// Check if any range contains the port
    #[must_use]
    pub fn contains(&self, port: u16) -> bool {
        self.ranges.iter().any(|r| r.contains(port))
    }

    /// Number of ranges
    #[must_use]
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Check if the list has no ranges
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl fmt::Display for PortList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{range}")?;
        }
        Ok(())
    }
}

/// Transport network of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// Transmission Control Protocol
    #[default]
    Tcp,
    /// User Datagram Protocol
    Udp,
}

impl Network {
    /// Parse a network name (case-insensitive)
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidNetwork` for anything but tcp/udp.
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            _ => Err(RuleError::InvalidNetwork(s.to_string())),
        }
    }

    /// Get the network as a static string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of accepted networks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkList {
    tcp: bool,
    udp: bool,
}

impl NetworkList {
    /// Parse `"tcp"`, `"udp"` or `"tcp,udp"`
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidNetwork` on unknown names or an empty list.
    ///
    /// # Examples
    ///
    /// ```
    /// use routing_engine::rules::{Network, NetworkList};
    ///
    /// let list = NetworkList::parse("tcp").unwrap();
    /// assert!(list.contains(Network::Tcp));
    /// assert!(!list.contains(Network::Udp));
    /// ```
    pub fn parse(s: &str) -> Result<Self, RuleError> {
        let mut list = Self::default();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match Network::parse(part)? {
                Network::Tcp => list.tcp = true,
                Network::Udp => list.udp = true,
            }
        }
        if list.is_empty() {
            return Err(RuleError::InvalidNetwork(s.to_string()));
        }
        Ok(list)
    }

    /// Check whether the network is accepted
    #[must_use]
    pub const fn contains(&self, network: Network) -> bool {
        match network {
            Network::Tcp => self.tcp,
            Network::Udp => self.udp,
        }
    }

    /// Check if no network is accepted
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        !self.tcp && !self.udp
    }
}
