//! Balancer selection, exhaustion and latency probing

use std::sync::Arc;
use std::time::Duration;

use routing_engine::balancer::Balancer;
use routing_engine::config::{BalancerConfig, RouterConfig, RuleConfig};
use routing_engine::dns::StaticDnsClient;
use routing_engine::error::RouteError;
use routing_engine::outbound::{HealthStatus, OutboundManager};
use routing_engine::router::{ProcessLifetime, RouteContext, Router};
use routing_engine::rules::Network;
use tokio_util::sync::CancellationToken;

use super::{build_router, outbounds};

fn balanced_config(strategy: &str, selector: &str) -> RouterConfig {
    RouterConfig {
        rules: vec![RuleConfig::to_balancer("all", "lb").with_network("tcp,udp")],
        balancers: vec![BalancerConfig::new("lb", vec![selector.to_string()]).with_strategy(strategy)],
        ..RouterConfig::default()
    }
}

#[test]
fn test_round_robin_visits_each_candidate_once_per_cycle() {
    let (router, _) = build_router(&balanced_config("roundRobin", "proxy-"), StaticDnsClient::new());
    let ctx = RouteContext::new(Network::Tcp, 443);
    let k = 3;

    for _ in 0..4 {
        let mut cycle: Vec<String> = (0..k)
            .map(|_| router.pick_route(&ctx).unwrap().unwrap().outbound_tag().to_string())
            .collect();
        cycle.sort();
        assert_eq!(cycle, vec!["proxy-a", "proxy-b", "proxy-c"]);
    }
}

#[test]
fn test_random_stays_within_candidates() {
    let (router, _) = build_router(&balanced_config("random", "proxy-"), StaticDnsClient::new());
    let ctx = RouteContext::new(Network::Udp, 443);

    for _ in 0..50 {
        let route = router.pick_route(&ctx).unwrap().unwrap();
        assert!(route.outbound_tag().starts_with("proxy-"));
    }
}

#[test]
fn test_unavailable_outbounds_are_skipped() {
    let manager = outbounds();
    manager.set_health("proxy-a", HealthStatus::Unhealthy);
    manager.set_enabled("proxy-c", false);

    let router = Router::init(
        &balanced_config("roundRobin", "proxy-"),
        Arc::new(StaticDnsClient::new()),
        manager.clone(),
        &ProcessLifetime::new(),
    )
    .unwrap();
    let ctx = RouteContext::new(Network::Tcp, 443);

    for _ in 0..4 {
        assert_eq!(router.pick_route(&ctx).unwrap().unwrap().outbound_tag(), "proxy-b");
    }

    // Registry changes are visible on the next pick.
    manager.set_health("proxy-a", HealthStatus::Healthy);
    let picks: Vec<String> = (0..2)
        .map(|_| router.pick_route(&ctx).unwrap().unwrap().outbound_tag().to_string())
        .collect();
    assert!(picks.contains(&"proxy-a".to_string()));
}

#[test]
fn test_exhausted_balancer_is_a_route_error() {
    let (router, _) = build_router(&balanced_config("random", "wg-"), StaticDnsClient::new());

    let err = router
        .pick_route(&RouteContext::new(Network::Tcp, 443))
        .unwrap_err();
    assert_eq!(err, RouteError::exhausted("lb"));
}

#[test]
fn test_unknown_strategy_fails_init() {
    let result = Router::init(
        &balanced_config("fastest", "proxy-"),
        Arc::new(StaticDnsClient::new()),
        outbounds(),
        &ProcessLifetime::new(),
    );
    assert!(result.is_err());
}

// ============================================================================
// Latency Probing
// ============================================================================

fn least_ping_balancer(manager: Arc<OutboundManager>) -> Arc<Balancer> {
    let config = BalancerConfig::new("fast", vec!["proxy-".into()])
        .with_strategy("leastPing")
        .with_probe_interval_secs(10);
    Arc::new(Balancer::build(&config, manager).unwrap())
}

#[test]
fn test_least_ping_without_samples_picks_first_candidate() {
    let balancer = least_ping_balancer(outbounds());
    assert_eq!(balancer.pick_outbound().unwrap(), "proxy-a");
}

#[tokio::test(start_paused = true)]
async fn test_prober_tracks_latency_until_cancelled() {
    let manager = outbounds();
    manager.record_latency("proxy-a", Duration::from_millis(80));
    manager.record_latency("proxy-b", Duration::from_millis(20));
    manager.record_latency("proxy-c", Duration::from_millis(50));

    let balancer = least_ping_balancer(manager.clone());
    let token = CancellationToken::new();
    let handle = balancer
        .inject_context(token.clone())
        .expect("leastPing starts a prober");

    // First tick fires immediately.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(balancer.pick_outbound().unwrap(), "proxy-b");

    manager.record_latency("proxy-a", Duration::from_millis(5));
    manager.set_health("proxy-b", HealthStatus::Unhealthy);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(balancer.pick_outbound().unwrap(), "proxy-a");

    token.cancel();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("prober stops on cancellation")
        .unwrap();

    // No more probing: new samples are not picked up.
    manager.record_latency("proxy-c", Duration::from_millis(1));
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(balancer.pick_outbound().unwrap(), "proxy-a");
}

#[tokio::test]
async fn test_non_probing_strategy_starts_no_task() {
    let config = BalancerConfig::new("rr", vec!["proxy-".into()]).with_strategy("roundRobin");
    let balancer = Arc::new(Balancer::build(&config, outbounds()).unwrap());
    assert!(balancer.inject_context(CancellationToken::new()).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_router_shutdown_stops_probers() {
    let manager = outbounds();
    manager.record_latency("proxy-a", Duration::from_millis(80));
    manager.record_latency("proxy-b", Duration::from_millis(120));
    manager.record_latency("proxy-c", Duration::from_millis(150));

    let lifetime = ProcessLifetime::new();
    let router = Router::init(
        &balanced_config("leastPing", "proxy-"),
        Arc::new(StaticDnsClient::new()),
        manager.clone(),
        &lifetime,
    )
    .unwrap();
    let balancer = router.balancer("lb").unwrap();

    // First round runs right after init.
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(
        balancer.strategy().sample("proxy-a"),
        Some(Some(Duration::from_millis(80)))
    );

    lifetime.shutdown();
    assert!(lifetime.is_shutdown());
    tokio::time::sleep(Duration::from_millis(1)).await;

    // Two intervals pass without the new latency being sampled.
    manager.record_latency("proxy-a", Duration::from_millis(5));
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(
        balancer.strategy().sample("proxy-a"),
        Some(Some(Duration::from_millis(80)))
    );

    let ctx = RouteContext::new(Network::Tcp, 443);
    assert_eq!(router.pick_route(&ctx).unwrap().unwrap().outbound_tag(), "proxy-a");
}
