//! Per-connection routing context
//!
//! [`RouteContext`] is built by the dispatcher for each connection and only
//! borrowed by the router. [`MatchContext`] wraps it for the duration of one
//! `pick_route` call and owns the lazily resolved target IPs.

use std::collections::HashMap;
use std::net::IpAddr;

use once_cell::unsync::OnceCell;
use tracing::{debug, warn};

use crate::dns::DnsClient;
use crate::rules::Network;

/// Connection metadata for rule matching.
///
/// # Example
///
/// ```
/// use routing_engine::router::RouteContext;
/// use routing_engine::rules::Network;
///
/// let ctx = RouteContext::new(Network::Tcp, 443)
///     .with_domain("example.com")
///     .with_inbound_tag("socks-in");
///
/// assert_eq!(ctx.domain(), Some("example.com"));
/// assert_eq!(ctx.target_port, 443);
/// assert!(!ctx.skip_dns_resolve);
/// ```
#[derive(Debug, Clone, Default)]
pub struct RouteContext {
    /// Destination domain (from the request or sniffing).
    pub target_domain: Option<String>,

    /// Destination IPs known before routing.
    pub target_ips: Vec<IpAddr>,

    /// Destination port.
    pub target_port: u16,

    /// Transport network.
    pub network: Network,

    /// Source IP address.
    pub source_ip: Option<IpAddr>,

    /// Source port.
    pub source_port: u16,

    /// Tag of the inbound that accepted the connection.
    pub inbound_tag: Option<String>,

    /// Authenticated user (email) on the inbound.
    pub user: Option<String>,

    /// Sniffed application protocol ("tls", "http", "quic", "bittorrent").
    pub protocol: Option<String>,

    /// Name of the local process that opened the connection.
    pub process_name: Option<String>,

    /// Absolute path of the local process executable.
    pub process_path: Option<String>,

    /// Request attributes; keys compare case-insensitively.
    pub attributes: HashMap<String, String>,

    /// Never resolve the target domain for this connection.
    ///
    /// Set by the DNS module when it routes its own upstream queries so that a
    /// DNS server given by domain name cannot recurse into itself.
    pub skip_dns_resolve: bool,
}

impl RouteContext {
    /// Create a context with the required transport fields.
    #[must_use]
    pub fn new(network: Network, target_port: u16) -> Self {
        Self {
            network,
            target_port,
            ..Self::default()
        }
    }

    /// Set the target domain.
    #[must_use]
    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.target_domain = Some(domain.into());
        self
    }

    /// Add a pre-supplied target IP.
    #[must_use]
    pub fn with_target_ip(mut self, ip: IpAddr) -> Self {
        self.target_ips.push(ip);
        self
    }

    /// Set the source address.
    #[must_use]
    pub const fn with_source(mut self, ip: IpAddr, port: u16) -> Self {
        self.source_ip = Some(ip);
        self.source_port = port;
        self
    }

    /// Set the inbound tag.
    #[must_use]
    pub fn with_inbound_tag(mut self, tag: impl Into<String>) -> Self {
        self.inbound_tag = Some(tag.into());
        self
    }

    /// Set the inbound user.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set the sniffed protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set the originating process.
    #[must_use]
    pub fn with_process(mut self, name: impl Into<String>, path: Option<String>) -> Self {
        self.process_name = Some(name.into());
        self.process_path = path;
        self
    }

    /// Add a request attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes
            .insert(key.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Set the skip-DNS flag.
    #[must_use]
    pub const fn skip_dns(mut self, skip: bool) -> Self {
        self.skip_dns_resolve = skip;
        self
    }

    /// Target domain, `None` when absent or empty.
    #[must_use]
    pub fn domain(&self) -> Option<&str> {
        self.target_domain.as_deref().filter(|d| !d.is_empty())
    }

    /// Look up an attribute (case-insensitive key).
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(&key.to_ascii_lowercase())
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }
}

/// A [`RouteContext`] as seen by conditions during one `pick_route` call.
///
/// Target IPs come from the context when pre-supplied. Otherwise, once a DNS
/// client is attached, the first IP condition that asks for them triggers a
/// single lookup; the result (empty on failure) is cached for the rest of
/// the call.
pub struct MatchContext<'a> {
    ctx: &'a RouteContext,
    dns: Option<&'a dyn DnsClient>,
    resolved: OnceCell<Vec<IpAddr>>,
}

impl<'a> MatchContext<'a> {
    /// Wrap a context with no DNS attached.
    #[must_use]
    pub fn new(ctx: &'a RouteContext) -> Self {
        Self {
            ctx,
            dns: None,
            resolved: OnceCell::new(),
        }
    }

    /// Attach a DNS client; later IP lookups may resolve the target domain.
    pub fn attach_dns(&mut self, dns: &'a dyn DnsClient) {
        self.dns = Some(dns);
    }

    /// The wrapped context.
    #[must_use]
    pub const fn context(&self) -> &'a RouteContext {
        self.ctx
    }

    /// Target IPs available to IP conditions.
    ///
    /// Returns the pre-supplied IPs if any; otherwise resolves the domain at
    /// most once when DNS is attached, and returns an empty slice when it is
    /// not.
    pub fn target_ips(&self) -> &[IpAddr] {
        if !self.ctx.target_ips.is_empty() {
            return &self.ctx.target_ips;
        }
        let (Some(dns), Some(domain)) = (self.dns, self.ctx.domain()) else {
            return &[];
        };

        self.resolved.get_or_init(|| match dns.lookup_ip(domain) {
            Ok(ips) => {
                debug!(domain, count = ips.len(), "Resolved target domain for routing");
                ips
            }
            Err(e) => {
                warn!(domain, error = %e, "DNS lookup failed, IP conditions will not match");
                Vec::new()
            }
        })
    }

    /// IPs resolved during this call, if a lookup happened.
    #[must_use]
    pub fn resolved_ips(&self) -> Option<&[IpAddr]> {
        self.resolved.get().map(Vec::as_slice)
    }

    /// Consume the view, returning the IPs resolved during this call.
    #[must_use]
    pub fn into_resolved(self) -> Option<Vec<IpAddr>> {
        self.resolved.into_inner()
    }
}

impl std::fmt::Debug for MatchContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchContext")
            .field("ctx", &self.ctx)
            .field("dns_attached", &self.dns.is_some())
            .field("resolved", &self.resolved.get())
            .finish()
    }
}
