//! Route picking: rule order, domain strategies and DNS accounting

use std::net::IpAddr;

use routing_engine::config::{load_config_str, DomainStrategy, RouterConfig, RuleConfig};
use routing_engine::dns::StaticDnsClient;
use routing_engine::router::RouteContext;
use routing_engine::rules::Network;

use super::build_router;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

fn config(strategy: DomainStrategy, rules: Vec<RuleConfig>) -> RouterConfig {
    RouterConfig {
        domain_strategy: strategy,
        rules,
        ..RouterConfig::default()
    }
}

fn internal_dns() -> StaticDnsClient {
    StaticDnsClient::new().with_host("internal.example", ip("10.1.2.3"))
}

// ============================================================================
// Rule Order
// ============================================================================

#[test]
fn test_earlier_rule_wins_when_both_match() {
    let config = config(
        DomainStrategy::AsIs,
        vec![
            RuleConfig::to_outbound("first", "proxy-a").with_domain(["domain:google.com"]),
            RuleConfig::to_outbound("second", "direct").with_port("443"),
        ],
    );
    let (router, _) = build_router(&config, StaticDnsClient::new());

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("www.google.com");
    let route = router.pick_route(&ctx).unwrap().unwrap();
    assert_eq!(route.rule_tag(), Some("first"));
    assert_eq!(route.outbound_tag(), "proxy-a");
}

#[test]
fn test_exact_domain_rule() {
    let config = config(
        DomainStrategy::AsIs,
        vec![RuleConfig::to_outbound("r1", "direct").with_domain(["full:example.com"])],
    );
    let (router, _) = build_router(&config, StaticDnsClient::new());

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("example.com");
    assert_eq!(router.pick_route(&ctx).unwrap().unwrap().outbound_tag(), "direct");

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("www.example.com");
    assert!(router.pick_route(&ctx).unwrap().is_none());
}

#[test]
fn test_fields_combine_with_and() {
    let config = config(
        DomainStrategy::AsIs,
        vec![RuleConfig::to_outbound("dns-udp", "direct")
            .with_port("53")
            .with_network("udp")
            .with_inbound_tag(["tun-in"])],
    );
    let (router, _) = build_router(&config, StaticDnsClient::new());

    let hit = RouteContext::new(Network::Udp, 53).with_inbound_tag("tun-in");
    assert!(router.pick_route(&hit).unwrap().is_some());

    let wrong_network = RouteContext::new(Network::Tcp, 53).with_inbound_tag("tun-in");
    assert!(router.pick_route(&wrong_network).unwrap().is_none());

    let wrong_inbound = RouteContext::new(Network::Udp, 53).with_inbound_tag("socks-in");
    assert!(router.pick_route(&wrong_inbound).unwrap().is_none());
}

// ============================================================================
// Domain Strategies
// ============================================================================

#[test]
fn test_ip_on_demand_resolves_for_cidr_rule() {
    let config = config(
        DomainStrategy::IpOnDemand,
        vec![RuleConfig::to_outbound("r1", "block").with_ip(["10.0.0.0/8"])],
    );
    let (router, dns) = build_router(&config, internal_dns());

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("internal.example");
    let route = router.pick_route(&ctx).unwrap().unwrap();

    assert_eq!(route.outbound_tag(), "block");
    assert_eq!(dns.lookup_count(), 1);
    assert_eq!(route.resolved_ips(), Some([ip("10.1.2.3")].as_slice()));
}

#[test]
fn test_as_is_never_resolves() {
    let config = config(
        DomainStrategy::AsIs,
        vec![RuleConfig::to_outbound("r1", "block").with_ip(["10.0.0.0/8"])],
    );
    let (router, dns) = build_router(&config, internal_dns());

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("internal.example");
    assert!(router.pick_route(&ctx).unwrap().is_none());
    assert_eq!(dns.lookup_count(), 0);
}

#[test]
fn test_ip_on_demand_reuses_lookup_across_rules() {
    let config = config(
        DomainStrategy::IpOnDemand,
        vec![
            RuleConfig::to_outbound("lan", "direct").with_ip(["192.168.0.0/16"]),
            RuleConfig::to_outbound("corp", "block").with_ip(["10.0.0.0/8"]),
        ],
    );
    let (router, dns) = build_router(&config, internal_dns());

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("internal.example");
    let route = router.pick_route(&ctx).unwrap().unwrap();

    assert_eq!(route.rule_tag(), Some("corp"));
    assert_eq!(dns.lookup_count(), 1);
}

#[test]
fn test_ip_on_demand_skips_lookup_when_cheap_field_fails() {
    let config = config(
        DomainStrategy::IpOnDemand,
        vec![RuleConfig::to_outbound("ssh-corp", "block")
            .with_ip(["10.0.0.0/8"])
            .with_port("22")],
    );
    let (router, dns) = build_router(&config, internal_dns());

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("internal.example");
    assert!(router.pick_route(&ctx).unwrap().is_none());
    assert_eq!(dns.lookup_count(), 0);
}

#[test]
fn test_pre_supplied_ips_need_no_lookup() {
    let config = config(
        DomainStrategy::IpOnDemand,
        vec![RuleConfig::to_outbound("r1", "block").with_ip(["10.0.0.0/8"])],
    );
    let (router, dns) = build_router(&config, internal_dns());

    let ctx = RouteContext::new(Network::Tcp, 443)
        .with_domain("internal.example")
        .with_target_ip(ip("10.9.9.9"));
    let route = router.pick_route(&ctx).unwrap().unwrap();

    assert_eq!(route.outbound_tag(), "block");
    assert!(route.resolved_ips().is_none());
    assert_eq!(dns.lookup_count(), 0);
}

#[test]
fn test_ip_if_non_match_double_miss() {
    let rules = vec![
        RuleConfig::to_outbound("ads", "block").with_domain(["keyword:ads"]),
        RuleConfig::to_outbound("lan", "direct").with_ip(["geoip:private"]),
        RuleConfig::to_outbound("ssh", "direct").with_port("22"),
    ];
    let rule_count = rules.len();
    let config = config(DomainStrategy::IpIfNonMatch, rules);
    let (router, dns) = build_router(
        &config,
        StaticDnsClient::new().with_host("example.com", ip("93.184.216.34")),
    );

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("example.com");
    let decision = router.decide(&ctx).unwrap();

    assert!(decision.route.is_none());
    assert_eq!(decision.passes, 2);
    assert_eq!(decision.rules_evaluated, 2 * rule_count);
    assert_eq!(dns.lookup_count(), 1);
}

#[test]
fn test_ip_if_non_match_matches_on_second_pass() {
    let config = config(
        DomainStrategy::IpIfNonMatch,
        vec![
            RuleConfig::to_outbound("google", "proxy-a").with_domain(["domain:google.com"]),
            RuleConfig::to_outbound("corp", "block").with_ip(["10.0.0.0/8"]),
        ],
    );
    let (router, dns) = build_router(&config, internal_dns());

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("internal.example");
    let decision = router.decide(&ctx).unwrap();

    assert_eq!(decision.route.unwrap().outbound_tag(), "block");
    assert_eq!(decision.passes, 2);
    assert_eq!(decision.rules_evaluated, 4);
    assert_eq!(dns.lookup_count(), 1);
}

#[test]
fn test_ip_if_non_match_needs_a_domain() {
    let config = config(
        DomainStrategy::IpIfNonMatch,
        vec![RuleConfig::to_outbound("corp", "block").with_ip(["10.0.0.0/8"])],
    );
    let (router, dns) = build_router(&config, internal_dns());

    let ctx = RouteContext::new(Network::Tcp, 443).with_target_ip(ip("1.1.1.1"));
    let decision = router.decide(&ctx).unwrap();

    assert!(decision.route.is_none());
    assert_eq!(decision.passes, 1);
    assert_eq!(dns.lookup_count(), 0);
}

#[test]
fn test_skip_dns_suppresses_lookups_for_every_strategy() {
    for strategy in [
        DomainStrategy::AsIs,
        DomainStrategy::UseIp,
        DomainStrategy::IpIfNonMatch,
        DomainStrategy::IpOnDemand,
    ] {
        let config = config(
            strategy,
            vec![RuleConfig::to_outbound("corp", "block").with_ip(["10.0.0.0/8"])],
        );
        let (router, dns) = build_router(&config, internal_dns());

        let ctx = RouteContext::new(Network::Tcp, 443)
            .with_domain("internal.example")
            .skip_dns(true);
        let decision = router.decide(&ctx).unwrap();

        assert!(decision.route.is_none(), "{strategy} matched without IPs");
        assert_eq!(decision.passes, 1, "{strategy} retried");
        assert_eq!(dns.lookup_count(), 0, "{strategy} resolved");
    }
}

#[test]
fn test_dns_failure_means_no_ip_match() {
    let config = config(
        DomainStrategy::IpOnDemand,
        vec![RuleConfig::to_outbound("corp", "block").with_ip(["10.0.0.0/8"])],
    );
    let (router, dns) = build_router(&config, StaticDnsClient::new());

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("unknown.example");
    assert!(router.pick_route(&ctx).unwrap().is_none());
    assert_eq!(dns.lookup_count(), 1);
}

// ============================================================================
// Configuration File
// ============================================================================

#[test]
fn test_route_from_json_config() {
    let config = load_config_str(
        r#"{
            "outbounds": ["direct", "block"],
            "routing": {
                "domainStrategy": "IPIfNonMatch",
                "rules": [
                    { "ruleTag": "ads", "domain": ["keyword:ads", "regexp:^track\\d+\\."], "outboundTag": "block" },
                    { "ruleTag": "lan", "ip": ["geoip:private"], "outboundTag": "direct" },
                    { "ruleTag": "bt", "protocol": ["bittorrent"], "outboundTag": "block" }
                ]
            }
        }"#,
    )
    .unwrap();
    let (router, dns) = build_router(
        &config.routing,
        StaticDnsClient::new().with_host("nas.home", ip("192.168.1.20")),
    );

    let ads = RouteContext::new(Network::Tcp, 443).with_domain("track42.example.com");
    assert_eq!(router.pick_route(&ads).unwrap().unwrap().rule_tag(), Some("ads"));

    let nas = RouteContext::new(Network::Tcp, 445).with_domain("nas.home");
    assert_eq!(router.pick_route(&nas).unwrap().unwrap().outbound_tag(), "direct");
    assert_eq!(dns.lookup_count(), 1);

    let bt = RouteContext::new(Network::Udp, 6881)
        .with_target_ip(ip("8.8.8.8"))
        .with_protocol("bittorrent");
    assert_eq!(router.pick_route(&bt).unwrap().unwrap().rule_tag(), Some("bt"));
}
