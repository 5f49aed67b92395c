//! routing-engine: rule-based outbound selection
//!
//! Loads a routing configuration, builds the router and either answers a
//! single route query or stays up with background balancer probing until
//! interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Validate a configuration
//! routing-engine -c config.json --check
//!
//! # Ask where a connection would go
//! routing-engine -c config.json --domain www.google.com --port 443
//!
//! # Resolve through a fixed host table instead of the system resolver
//! routing-engine -c config.json --domain example.com --host example.com=93.184.216.34
//! ```

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::signal;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use routing_engine::config::{load_config_with_env, Config};
use routing_engine::dns::{DnsClient, StaticDnsClient, SystemDnsClient};
use routing_engine::outbound::{OutboundManager, OutboundManagerBuilder};
use routing_engine::router::{Decision, ProcessLifetime, RouteContext, Router};
use routing_engine::rules::Network;

/// Command-line arguments
#[derive(Default)]
struct Args {
    /// Configuration file path
    config_path: PathBuf,
    /// Check configuration only
    check_config: bool,
    /// Query: target domain
    domain: Option<String>,
    /// Query: target IP
    ip: Option<IpAddr>,
    /// Query: target port
    port: u16,
    /// Query: network
    network: Network,
    /// Query: inbound tag
    inbound: Option<String>,
    /// Extra outbound tags registered on top of the configuration
    outbounds: Vec<String>,
    /// Static host entries; when present, the system resolver is not used
    hosts: Vec<(String, IpAddr)>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = std::env::args().skip(1);
        let mut parsed = Self {
            config_path: PathBuf::from("/etc/routing-engine/config.json"),
            port: 443,
            ..Self::default()
        };

        while let Some(arg) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| anyhow!("Missing value for {name}"))
            };
            match arg.as_str() {
                "-c" | "--config" => parsed.config_path = PathBuf::from(value("--config")?),
                "--check" => parsed.check_config = true,
                "--domain" => parsed.domain = Some(value("--domain")?),
                "--ip" => {
                    let raw = value("--ip")?;
                    parsed.ip = Some(raw.parse().with_context(|| format!("Invalid IP: {raw}"))?);
                }
                "--port" => {
                    let raw = value("--port")?;
                    parsed.port = raw.parse().with_context(|| format!("Invalid port: {raw}"))?;
                }
                "--network" => {
                    let raw = value("--network")?;
                    parsed.network = Network::parse(&raw)?;
                }
                "--inbound" => parsed.inbound = Some(value("--inbound")?),
                "--outbounds" => parsed.outbounds.extend(
                    value("--outbounds")?
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                ),
                "--host" => {
                    let raw = value("--host")?;
                    let (domain, ip) = raw
                        .split_once('=')
                        .ok_or_else(|| anyhow!("Expected domain=ip, got {raw}"))?;
                    let ip = ip.parse().with_context(|| format!("Invalid IP in --host {raw}"))?;
                    parsed.hosts.push((domain.to_string(), ip));
                }
                "-h" | "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "-v" | "--version" => {
                    println!("routing-engine v{}", routing_engine::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {arg}");
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        Ok(parsed)
    }

    fn has_query(&self) -> bool {
        self.domain.is_some() || self.ip.is_some()
    }

    fn route_context(&self) -> RouteContext {
        let mut ctx = RouteContext::new(self.network, self.port);
        if let Some(domain) = &self.domain {
            ctx = ctx.with_domain(domain.as_str());
        }
        if let Some(ip) = self.ip {
            ctx = ctx.with_target_ip(ip);
        }
        if let Some(inbound) = &self.inbound {
            ctx = ctx.with_inbound_tag(inbound.as_str());
        }
        ctx
    }
}

fn print_help() {
    println!(
        r"routing-engine v{}

Rule-based outbound selection with balancers and hot reload.

USAGE:
    routing-engine [OPTIONS]

OPTIONS:
    -c, --config <PATH>      Configuration file path [default: /etc/routing-engine/config.json]
    --check                  Check configuration and exit
    --domain <DOMAIN>        Route query: target domain
    --ip <IP>                Route query: target IP
    --port <PORT>            Route query: target port [default: 443]
    --network <tcp|udp>      Route query: network [default: tcp]
    --inbound <TAG>          Route query: inbound tag
    --outbounds <A,B,...>    Register extra outbound tags
    --host <DOMAIN=IP>       Static DNS entry (repeatable); disables the system resolver
    -h, --help               Print help information
    -v, --version            Print version information

ENVIRONMENT:
    ROUTING_ENGINE_LOG_LEVEL        Override log level (trace, debug, info, warn, error)
    ROUTING_ENGINE_DOMAIN_STRATEGY  Override domain strategy (AsIs, UseIP, IPIfNonMatch, IPOnDemand)

Without a route query the router stays up, probing balancers, until Ctrl-C.
",
        routing_engine::VERSION
    );
}

/// Initialize logging
fn init_logging(config: &Config) {
    let level = match config.log.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.log.target)
        .with_writer(std::io::stderr);

    match (config.log.format == "json", config.log.timestamps) {
        (true, true) => subscriber.json().init(),
        (true, false) => subscriber.json().without_time().init(),
        (false, true) => subscriber.init(),
        (false, false) => subscriber.without_time().init(),
    }
}

/// Build outbound manager from configuration plus command-line extras
fn build_outbound_manager(config: &Config, extra: &[String]) -> Arc<OutboundManager> {
    let mut builder = OutboundManagerBuilder::new();
    builder.add_all(&config.outbounds).add_all(extra);
    let manager = builder.build();

    info!(
        "Initialized {} outbounds: {:?}",
        manager.len(),
        manager.tags()
    );

    Arc::new(manager)
}

fn build_dns(hosts: &[(String, IpAddr)]) -> Arc<dyn DnsClient> {
    if hosts.is_empty() {
        return Arc::new(SystemDnsClient::new());
    }
    let client = StaticDnsClient::new();
    for (domain, ip) in hosts {
        client.insert(domain, *ip);
    }
    Arc::new(client)
}

fn print_decision(ctx: &RouteContext, decision: &Decision) {
    println!("query:           {:?} {}:{}", ctx.domain(), ctx.network, ctx.target_port);
    match &decision.route {
        Some(route) => {
            println!("outbound:        {}", route.outbound_tag());
            if !route.outbound_group_tags().is_empty() {
                println!("balancer:        {}", route.outbound_group_tags().join(","));
            }
            println!("rule:            {}", route.rule_tag().unwrap_or("<untagged>"));
            if let Some(ips) = route.resolved_ips() {
                println!("resolved:        {ips:?}");
            }
        }
        None => println!("outbound:        <no match>"),
    }
    println!("passes:          {}", decision.passes);
    println!("rules evaluated: {}", decision.rules_evaluated);
    println!("rule set:        v{}", decision.version);
}

/// Main application entry point
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse()?;

    let config = load_config_with_env(&args.config_path).with_context(|| {
        format!("Failed to load configuration from {:?}", args.config_path)
    })?;

    if args.check_config {
        println!("Configuration is valid");
        return Ok(());
    }

    init_logging(&config);
    info!("routing-engine v{}", routing_engine::VERSION);

    let outbound_manager = build_outbound_manager(&config, &args.outbounds);
    let dns = build_dns(&args.hosts);
    let lifetime = ProcessLifetime::new();

    let router = Router::init(&config.routing, dns, outbound_manager.clone(), &lifetime)
        .context("Failed to build router")?;

    if args.has_query() {
        let ctx = args.route_context();
        let decision = router.decide(&ctx)?;
        print_decision(&ctx, &decision);
        lifetime.shutdown();
        return Ok(());
    }

    info!(
        rules = router.rule_count(),
        balancers = ?router.balancer_tags(),
        "Router ready, waiting for shutdown signal"
    );
    signal::ctrl_c().await?;

    info!("Shutdown signal received");
    outbound_manager.log_status();
    lifetime.shutdown();
    Ok(())
}
