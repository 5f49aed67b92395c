//! Runtime rule mutation: reload, add, remove and reader consistency

use std::sync::atomic::{AtomicBool, Ordering};

use routing_engine::config::{BalancerConfig, RouterConfig, RuleConfig};
use routing_engine::dns::StaticDnsClient;
use routing_engine::error::{RouterError, RuleError};
use routing_engine::router::RouteContext;
use routing_engine::rules::Network;

use super::build_router;

fn batch(rules: Vec<RuleConfig>) -> RouterConfig {
    RouterConfig {
        rules,
        ..RouterConfig::default()
    }
}

fn base_config() -> RouterConfig {
    RouterConfig {
        rules: vec![
            RuleConfig::to_outbound("r1", "direct").with_domain(["full:example.com"]),
            RuleConfig::to_outbound("r2", "block").with_port("25"),
        ],
        balancers: vec![BalancerConfig::new("proxies", vec!["proxy-".into()])
            .with_strategy("roundRobin")],
        ..RouterConfig::default()
    }
}

#[test]
fn test_reload_duplicate_tag_rejected() {
    let (router, _) = build_router(&base_config(), StaticDnsClient::new());

    let err = router
        .reload_rules(&batch(vec![RuleConfig::to_outbound("r1", "block").with_port("22")]))
        .unwrap_err();

    assert!(matches!(err, RouterError::Rule(RuleError::DuplicateRuleTag(ref tag)) if tag == "r1"));
    assert_eq!(router.rule_count(), 2);
}

#[test]
fn test_reload_is_all_or_nothing() {
    let (router, _) = build_router(&base_config(), StaticDnsClient::new());
    let version = router.version();

    // Valid rules ahead of the collision must not be applied either.
    let err = router
        .reload_rules(&batch(vec![
            RuleConfig::to_outbound("ok-1", "direct").with_port("80"),
            RuleConfig::to_outbound("ok-2", "direct").with_port("8080"),
            RuleConfig::to_outbound("r2", "block").with_port("22"),
        ]))
        .unwrap_err();
    assert!(matches!(err, RouterError::Rule(RuleError::DuplicateRuleTag(_))));

    let err = router
        .reload_rules(&batch(vec![
            RuleConfig::to_outbound("dup", "direct").with_port("80"),
            RuleConfig::to_outbound("dup", "direct").with_port("81"),
        ]))
        .unwrap_err();
    assert!(matches!(err, RouterError::Rule(RuleError::DuplicateRuleTag(_))));

    let err = router
        .reload_rules(&batch(vec![
            RuleConfig::to_outbound("ok-3", "direct").with_port("80"),
            RuleConfig::to_outbound("bad", "direct").with_domain(["regexp:(unclosed"]),
        ]))
        .unwrap_err();
    assert!(matches!(err, RouterError::Rule(RuleError::InvalidRegex(_))));

    assert_eq!(router.rule_tags(), vec!["r1", "r2"]);
    assert_eq!(router.version(), version);
    assert_eq!(router.config().rules.len(), 2);
}

#[test]
fn test_reload_dangling_balancer_rejected() {
    let (router, _) = build_router(&base_config(), StaticDnsClient::new());

    let err = router
        .reload_rules(&batch(vec![RuleConfig::to_balancer("x", "ghosts").with_port("443")]))
        .unwrap_err();
    assert!(matches!(err, RouterError::Rule(RuleError::BalancerNotFound(ref tag)) if tag == "ghosts"));

    router
        .reload_rules(&batch(vec![RuleConfig::to_balancer("x", "proxies").with_port("443")]))
        .unwrap();
    let route = router
        .pick_route(&RouteContext::new(Network::Tcp, 443))
        .unwrap()
        .unwrap();
    assert_eq!(route.outbound_group_tags(), ["proxies".to_string()]);
}

#[test]
fn test_reloaded_rules_go_last() {
    let (router, _) = build_router(&base_config(), StaticDnsClient::new());
    router
        .reload_rules(&batch(vec![
            RuleConfig::to_outbound("smtp-alt", "direct").with_port("25,587"),
        ]))
        .unwrap();

    assert_eq!(router.rule_tags(), vec!["r1", "r2", "smtp-alt"]);

    // r2 still shadows the appended rule for port 25.
    let smtp = RouteContext::new(Network::Tcp, 25);
    assert_eq!(router.pick_route(&smtp).unwrap().unwrap().rule_tag(), Some("r2"));
    let submission = RouteContext::new(Network::Tcp, 587);
    assert_eq!(
        router.pick_route(&submission).unwrap().unwrap().rule_tag(),
        Some("smtp-alt")
    );
}

#[test]
fn test_reload_keeps_init_domain_strategy() {
    let (router, _) = build_router(&base_config(), StaticDnsClient::new());
    let mut update = batch(vec![RuleConfig::to_outbound("r3", "direct").with_port("53")]);
    update.domain_strategy = routing_engine::config::DomainStrategy::IpOnDemand;

    router.reload_rules(&update).unwrap();
    assert_eq!(router.domain_strategy(), routing_engine::config::DomainStrategy::AsIs);
}

#[test]
fn test_add_rule_from_json() {
    let (router, _) = build_router(&base_config(), StaticDnsClient::new());

    router
        .add_rule(
            r#"{ "rules": [
                { "ruleTag": "quic", "network": "udp", "port": "443", "outboundTag": "block" }
            ] }"#,
        )
        .unwrap();

    let ctx = RouteContext::new(Network::Udp, 443);
    assert_eq!(router.pick_route(&ctx).unwrap().unwrap().outbound_tag(), "block");

    let err = router.add_rule(r#"{ "rules": [{ "ruleTag": "x" }] }"#).unwrap_err();
    assert!(matches!(err, RouterError::Rule(RuleError::MissingTarget { .. })));
}

#[test]
fn test_remove_rule_semantics() {
    let (router, _) = build_router(&base_config(), StaticDnsClient::new());

    assert!(matches!(
        router.remove_rule(""),
        Err(RouterError::Rule(RuleError::EmptyTag))
    ));
    assert_eq!(router.rule_count(), 2);

    assert_eq!(router.remove_rule("not-there").unwrap(), 0);
    assert_eq!(router.rule_count(), 2);

    assert_eq!(router.remove_rule("r1").unwrap(), 1);
    assert_eq!(router.rule_count(), 1);
    assert!(!router.rule_exists("r1"));

    let ctx = RouteContext::new(Network::Tcp, 443).with_domain("example.com");
    assert!(router.pick_route(&ctx).unwrap().is_none());

    // The tag is free again.
    router
        .reload_rules(&batch(vec![RuleConfig::to_outbound("r1", "proxy-a").with_port("443")]))
        .unwrap();
    assert_eq!(router.pick_route(&ctx).unwrap().unwrap().outbound_tag(), "proxy-a");
}

#[test]
fn test_readers_see_whole_snapshots() {
    const BATCH: usize = 5;
    const RELOADS: usize = 200;

    let initial = batch(
        (0..BATCH)
            .map(|i| RuleConfig::to_outbound(format!("base-{i}"), "direct").with_port("1"))
            .collect(),
    );
    let (router, _) = build_router(&initial, StaticDnsClient::new());
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                let ctx = RouteContext::new(Network::Tcp, 443);
                let mut last_version = 0;
                while !done.load(Ordering::Acquire) {
                    let decision = router.decide(&ctx).unwrap();
                    assert!(decision.route.is_none());
                    // Every published list is BATCH rules per version.
                    assert_eq!(decision.rules_evaluated, BATCH * decision.version as usize);
                    assert!(decision.version >= last_version);
                    last_version = decision.version;
                }
            });
        }

        for n in 0..RELOADS {
            let rules = (0..BATCH)
                .map(|i| RuleConfig::to_outbound(format!("gen-{n}-{i}"), "direct").with_port("1"))
                .collect();
            router.reload_rules(&batch(rules)).unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(router.rule_count(), BATCH * (RELOADS + 1));
    assert_eq!(router.version(), (RELOADS + 1) as u64);
}
