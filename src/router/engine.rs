//! Router: rule evaluation and hot reload

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::{debug, info, trace};

use super::context::{MatchContext, RouteContext};
use super::route::{Decision, Route};
use super::Dispatcher;
use crate::balancer::Balancer;
use crate::config::{parse_rule_set, DomainStrategy, RouterConfig, RuleTargetRef};
use crate::dns::DnsClient;
use crate::error::{Result, RouteError, RuleError};
use crate::outbound::OutboundRegistry;
use crate::rules::Rule;

/// Immutable rule list published to readers.
///
/// `config` mirrors `rules`: every rule in the list has its configuration
/// in `config.rules`, in the same order.
#[derive(Debug)]
struct RuleSet {
    rules: Vec<Arc<Rule>>,
    config: Arc<RouterConfig>,
    version: u64,
}

impl RuleSet {
    fn contains_tag(&self, tag: &str) -> bool {
        !tag.is_empty() && self.rules.iter().any(|r| r.rule_tag() == tag)
    }
}

/// Picks an outbound for each connection from an ordered rule list.
///
/// # Thread Safety
///
/// `pick_route` is lock-free and may run from any number of threads while
/// a writer reloads or removes rules. Each call sees exactly one published
/// rule list.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use routing_engine::config::{RouterConfig, RuleConfig};
/// use routing_engine::dns::StaticDnsClient;
/// use routing_engine::outbound::OutboundManager;
/// use routing_engine::router::{ProcessLifetime, RouteContext, Router};
/// use routing_engine::rules::Network;
///
/// let config = RouterConfig {
///     rules: vec![RuleConfig::to_outbound("google", "proxy").with_domain(["domain:google.com"])],
///     ..RouterConfig::default()
/// };
/// let router = Router::init(
///     &config,
///     Arc::new(StaticDnsClient::new()),
///     Arc::new(OutboundManager::new()),
///     &ProcessLifetime::new(),
/// )
/// .unwrap();
///
/// let ctx = RouteContext::new(Network::Tcp, 443).with_domain("mail.google.com");
/// let route = router.pick_route(&ctx).unwrap().unwrap();
/// assert_eq!(route.outbound_tag(), "proxy");
///
/// let ctx = RouteContext::new(Network::Tcp, 443).with_domain("example.com");
/// assert!(router.pick_route(&ctx).unwrap().is_none());
/// ```
pub struct Router {
    domain_strategy: DomainStrategy,
    dns: Arc<dyn DnsClient>,
    balancers: HashMap<String, Arc<Balancer>>,
    state: ArcSwap<RuleSet>,
    write_lock: Mutex<()>,
}

impl Router {
    /// Build a router from configuration.
    ///
    /// Validates the whole configuration before compiling anything, builds
    /// the balancer table, then compiles rules in order. Balancers that probe
    /// start their background task only once everything compiled, bound to
    /// the dispatcher's lifetime token.
    ///
    /// The domain strategy and balancer table are fixed for the router's
    /// lifetime.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Rule` for any invalid rule or balancer.
    pub fn init(
        config: &RouterConfig,
        dns: Arc<dyn DnsClient>,
        registry: Arc<dyn OutboundRegistry>,
        dispatcher: &dyn Dispatcher,
    ) -> Result<Self> {
        config.validate()?;

        let mut balancers = HashMap::with_capacity(config.balancers.len());
        for balancer_config in &config.balancers {
            let balancer = Balancer::build(balancer_config, Arc::clone(&registry))?;
            balancers.insert(balancer_config.tag.clone(), Arc::new(balancer));
        }

        let rules = compile_rules(config, &balancers)?;

        let lifetime = dispatcher.lifetime();
        for balancer in balancers.values() {
            if balancer.inject_context(lifetime.clone()).is_some() {
                debug!(balancer = %balancer.tag(), "Balancer prober attached");
            }
        }

        info!(
            rules = rules.len(),
            balancers = balancers.len(),
            domain_strategy = %config.domain_strategy,
            "Router initialized"
        );

        Ok(Self {
            domain_strategy: config.domain_strategy,
            dns,
            balancers,
            state: ArcSwap::from_pointee(RuleSet {
                rules,
                config: Arc::new(config.clone()),
                version: 1,
            }),
            write_lock: Mutex::new(()),
        })
    }

    /// Pick the route for a connection.
    ///
    /// Returns `Ok(None)` when no rule matches.
    ///
    /// # Errors
    ///
    /// Returns `RouteError::BalancerExhausted` if the matching rule targets a
    /// balancer with no live candidate.
    pub fn pick_route(&self, ctx: &RouteContext) -> std::result::Result<Option<Route>, RouteError> {
        self.decide(ctx).map(|decision| decision.route)
    }

    /// Pick the route for a connection, reporting how it was reached.
    ///
    /// # Errors
    ///
    /// Same as [`Router::pick_route`].
    pub fn decide(&self, ctx: &RouteContext) -> std::result::Result<Decision, RouteError> {
        let snapshot = self.state.load();
        let skip_dns = ctx.skip_dns_resolve;

        let mut view = MatchContext::new(ctx);
        if self.domain_strategy == DomainStrategy::IpOnDemand && !skip_dns {
            view.attach_dns(self.dns.as_ref());
        }

        let mut rules_evaluated = 0;
        let mut passes = 1;
        let mut matched = first_match(&snapshot.rules, &view, &mut rules_evaluated);

        if matched.is_none()
            && self.domain_strategy == DomainStrategy::IpIfNonMatch
            && ctx.domain().is_some()
            && !skip_dns
        {
            trace!(domain = ?ctx.domain(), "No match on first pass, retrying with DNS");
            view.attach_dns(self.dns.as_ref());
            passes = 2;
            matched = first_match(&snapshot.rules, &view, &mut rules_evaluated);
        }

        let route = match matched {
            Some(rule) => {
                let outbound_tag = rule.resolve_tag()?;
                debug!(
                    rule = %rule.rule_tag(),
                    outbound = %outbound_tag,
                    pass = passes,
                    "Route decided"
                );
                Some(Route::new(
                    outbound_tag,
                    rule.balancer_tag(),
                    rule.rule_tag(),
                    view.into_resolved(),
                ))
            }
            None => {
                debug!(domain = ?ctx.domain(), passes, "No rule matched");
                None
            }
        };

        Ok(Decision {
            route,
            passes,
            rules_evaluated,
            version: snapshot.version,
        })
    }

    /// Append a batch of rules to the active list.
    ///
    /// The batch is accepted or rejected as a whole: on any error the active
    /// rules stay untouched. Balancer definitions and the domain strategy in
    /// `config` are ignored; balancer references resolve against the table
    /// built at init.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::DuplicateRuleTag` if a rule tag collides with an
    /// active rule or another rule of the batch, `RuleError::BalancerNotFound`
    /// for a dangling balancer reference, or any rule compile error.
    pub fn reload_rules(&self, config: &RouterConfig) -> Result<()> {
        let _guard = self.write_lock.lock();

        config.validate_rules()?;

        let current = self.state.load_full();
        for rule_config in &config.rules {
            if current.contains_tag(&rule_config.rule_tag) {
                return Err(RuleError::DuplicateRuleTag(rule_config.rule_tag.clone()).into());
            }
            if let RuleTargetRef::Balancer(tag) = rule_config.target()? {
                if !self.balancers.contains_key(tag) {
                    return Err(RuleError::BalancerNotFound(tag.to_string()).into());
                }
            }
        }

        let added = compile_rules(config, &self.balancers)?;
        let added_count = added.len();

        let mut rules = current.rules.clone();
        rules.extend(added);

        let mut merged = (*current.config).clone();
        merged.rules.extend(config.rules.iter().cloned());

        let version = current.version + 1;
        self.state.store(Arc::new(RuleSet {
            rules,
            config: Arc::new(merged),
            version,
        }));

        info!(
            added = added_count,
            total = current.rules.len() + added_count,
            version,
            "Routing rules reloaded"
        );
        Ok(())
    }

    /// Append rules from a serialized rule-set payload.
    ///
    /// The payload is a JSON routing object, `{"rules": [...]}`.
    ///
    /// # Errors
    ///
    /// Returns `RouterError::Config` if the payload does not parse, otherwise
    /// the same errors as [`Router::reload_rules`].
    pub fn add_rule(&self, serialized: &str) -> Result<()> {
        let rule_set = parse_rule_set(serialized)?;
        self.reload_rules(&rule_set)
    }

    /// Remove every active rule tagged `tag`.
    ///
    /// Returns the number of rules removed; zero leaves the router untouched.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::EmptyTag` for an empty tag.
    pub fn remove_rule(&self, tag: &str) -> Result<usize> {
        if tag.is_empty() {
            return Err(RuleError::EmptyTag.into());
        }

        let _guard = self.write_lock.lock();
        let current = self.state.load_full();

        let rules: Vec<Arc<Rule>> = current
            .rules
            .iter()
            .filter(|rule| rule.rule_tag() != tag)
            .cloned()
            .collect();
        let removed = current.rules.len() - rules.len();
        if removed == 0 {
            debug!(tag, "No rule with this tag, nothing removed");
            return Ok(0);
        }

        let mut config = (*current.config).clone();
        config.rules.retain(|rule| rule.rule_tag != tag);

        let version = current.version + 1;
        self.state.store(Arc::new(RuleSet {
            rules,
            config: Arc::new(config),
            version,
        }));

        info!(tag, removed, version, "Routing rules removed");
        Ok(removed)
    }

    /// Check whether an active rule has this tag
    #[must_use]
    pub fn rule_exists(&self, tag: &str) -> bool {
        self.state.load().contains_tag(tag)
    }

    /// Number of active rules
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.state.load().rules.len()
    }

    /// Tags of the active rules in evaluation order; untagged rules are skipped
    #[must_use]
    pub fn rule_tags(&self) -> Vec<String> {
        self.state
            .load()
            .rules
            .iter()
            .filter(|rule| !rule.rule_tag().is_empty())
            .map(|rule| rule.rule_tag().to_string())
            .collect()
    }

    /// Version of the active rule list, bumped on each published change
    #[must_use]
    pub fn version(&self) -> u64 {
        self.state.load().version
    }

    /// Configuration matching the active rule list
    #[must_use]
    pub fn config(&self) -> Arc<RouterConfig> {
        Arc::clone(&self.state.load().config)
    }

    /// Domain strategy fixed at init
    #[must_use]
    pub const fn domain_strategy(&self) -> DomainStrategy {
        self.domain_strategy
    }

    /// Look up a balancer by tag
    #[must_use]
    pub fn balancer(&self, tag: &str) -> Option<Arc<Balancer>> {
        self.balancers.get(tag).cloned()
    }

    /// Tags of all balancers, sorted
    #[must_use]
    pub fn balancer_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self.balancers.keys().cloned().collect();
        tags.sort();
        tags
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.state.load();
        f.debug_struct("Router")
            .field("domain_strategy", &self.domain_strategy)
            .field("rules", &snapshot.rules.len())
            .field("balancers", &self.balancer_tags())
            .field("version", &snapshot.version)
            .finish_non_exhaustive()
    }
}

fn compile_rules(
    config: &RouterConfig,
    balancers: &HashMap<String, Arc<Balancer>>,
) -> std::result::Result<Vec<Arc<Rule>>, RuleError> {
    config
        .rules
        .iter()
        .map(|rule| Rule::build(rule, balancers).map(Arc::new))
        .collect()
}

fn first_match(
    rules: &[Arc<Rule>],
    view: &MatchContext<'_>,
    evaluated: &mut usize,
) -> Option<Arc<Rule>> {
    for rule in rules {
        *evaluated += 1;
        if rule.apply(view) {
            return Some(Arc::clone(rule));
        }
        trace!(rule = %rule.rule_tag(), "Rule did not match");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BalancerConfig, RuleConfig};
    use crate::dns::StaticDnsClient;
    use crate::error::RouterError;
    use crate::outbound::OutboundManager;
    use crate::router::ProcessLifetime;
    use crate::rules::Network;

    fn router_with(config: &RouterConfig) -> (Router, Arc<StaticDnsClient>) {
        let dns = Arc::new(
            StaticDnsClient::new().with_host("example.com", "93.184.216.34".parse().unwrap()),
        );
        let manager = Arc::new(OutboundManager::new());
        manager.add("proxy-a");
        manager.add("proxy-b");
        let router = Router::init(config, dns.clone(), manager, &ProcessLifetime::new()).unwrap();
        (router, dns)
    }

    fn basic_config() -> RouterConfig {
        RouterConfig {
            rules: vec![
                RuleConfig::to_outbound("ads", "block").with_domain(["keyword:ads"]),
                RuleConfig::to_outbound("web", "direct").with_port("80,443"),
            ],
            ..RouterConfig::default()
        }
    }

    #[test]
    fn test_first_match_wins() {
        let (router, _) = router_with(&basic_config());
        let ctx = RouteContext::new(Network::Tcp, 443).with_domain("ads.example.com");

        let decision = router.decide(&ctx).unwrap();
        let route = decision.route.unwrap();
        assert_eq!(route.outbound_tag(), "block");
        assert_eq!(route.rule_tag(), Some("ads"));
        assert_eq!(decision.rules_evaluated, 1);
        assert_eq!(decision.passes, 1);
    }

    #[test]
    fn test_no_match() {
        let (router, _) = router_with(&basic_config());
        let ctx = RouteContext::new(Network::Udp, 53);
        assert_eq!(router.pick_route(&ctx).unwrap(), None);
    }

    #[test]
    fn test_init_rejects_duplicate_tags() {
        let mut config = basic_config();
        config.rules.push(RuleConfig::to_outbound("ads", "block").with_port("22"));
        let result = Router::init(
            &config,
            Arc::new(StaticDnsClient::new()),
            Arc::new(OutboundManager::new()),
            &ProcessLifetime::new(),
        );
        assert!(matches!(
            result,
            Err(RouterError::Rule(RuleError::DuplicateRuleTag(tag))) if tag == "ads"
        ));
    }

    #[test]
    fn test_ip_if_non_match_retries_once() {
        let config = RouterConfig {
            domain_strategy: DomainStrategy::IpIfNonMatch,
            rules: vec![
                RuleConfig::to_outbound("lan", "direct").with_ip(["10.0.0.0/8"]),
                RuleConfig::to_outbound("ssh", "direct").with_port("22"),
            ],
            ..RouterConfig::default()
        };
        let (router, dns) = router_with(&config);

        let ctx = RouteContext::new(Network::Tcp, 443).with_domain("example.com");
        let decision = router.decide(&ctx).unwrap();
        assert!(decision.route.is_none());
        assert_eq!(decision.passes, 2);
        assert_eq!(decision.rules_evaluated, 4);
        assert_eq!(dns.lookup_count(), 1);
    }

    #[test]
    fn test_use_ip_behaves_as_is() {
        let config = RouterConfig {
            domain_strategy: DomainStrategy::UseIp,
            rules: vec![RuleConfig::to_outbound("web", "proxy").with_ip(["93.184.216.0/24"])],
            ..RouterConfig::default()
        };
        let (router, dns) = router_with(&config);

        let ctx = RouteContext::new(Network::Tcp, 443).with_domain("example.com");
        assert!(router.pick_route(&ctx).unwrap().is_none());
        assert_eq!(dns.lookup_count(), 0);
    }

    #[test]
    fn test_balancer_route_carries_group_tag() {
        let config = RouterConfig {
            rules: vec![RuleConfig::to_balancer("rest", "lb").with_network("tcp")],
            balancers: vec![BalancerConfig::new("lb", vec!["proxy-".into()])
                .with_strategy("roundRobin")],
            ..RouterConfig::default()
        };
        let (router, _) = router_with(&config);

        let route = router
            .pick_route(&RouteContext::new(Network::Tcp, 443))
            .unwrap()
            .unwrap();
        assert_eq!(route.outbound_tag(), "proxy-a");
        assert_eq!(route.outbound_group_tags(), ["lb".to_string()]);
        assert_eq!(router.balancer_tags(), vec!["lb"]);
        assert!(router.balancer("lb").is_some());
    }

    #[test]
    fn test_reload_appends_and_bumps_version() {
        let (router, _) = router_with(&basic_config());
        assert_eq!(router.version(), 1);

        let batch = RouterConfig {
            rules: vec![RuleConfig::to_outbound("dns", "direct").with_port("53")],
            ..RouterConfig::default()
        };
        router.reload_rules(&batch).unwrap();

        assert_eq!(router.version(), 2);
        assert_eq!(router.rule_tags(), vec!["ads", "web", "dns"]);
        assert_eq!(router.config().rules.len(), 3);
    }

    #[test]
    fn test_reload_rejects_collision_atomically() {
        let (router, _) = router_with(&basic_config());
        let batch = RouterConfig {
            rules: vec![
                RuleConfig::to_outbound("dns", "direct").with_port("53"),
                RuleConfig::to_outbound("web", "direct").with_port("8080"),
            ],
            ..RouterConfig::default()
        };

        let err = router.reload_rules(&batch).unwrap_err();
        assert!(matches!(err, RouterError::Rule(RuleError::DuplicateRuleTag(ref t)) if t == "web"));
        assert_eq!(router.rule_count(), 2);
        assert!(!router.rule_exists("dns"));
        assert_eq!(router.version(), 1);
    }

    #[test]
    fn test_reload_rejects_unknown_balancer() {
        let (router, _) = router_with(&basic_config());
        let batch = RouterConfig {
            rules: vec![RuleConfig::to_balancer("x", "ghost").with_port("53")],
            ..RouterConfig::default()
        };
        let err = router.reload_rules(&batch).unwrap_err();
        assert!(matches!(err, RouterError::Rule(RuleError::BalancerNotFound(_))));
        assert_eq!(router.rule_count(), 2);
    }

    #[test]
    fn test_add_rule_payload() {
        let (router, _) = router_with(&basic_config());
        router
            .add_rule(r#"{ "rules": [{ "ruleTag": "ssh", "port": 22, "outboundTag": "block" }] }"#)
            .unwrap();
        assert!(router.rule_exists("ssh"));

        let err = router.add_rule("not json").unwrap_err();
        assert!(matches!(err, RouterError::Config(_)));
    }

    #[test]
    fn test_remove_rule() {
        let (router, _) = router_with(&basic_config());

        assert!(matches!(
            router.remove_rule(""),
            Err(RouterError::Rule(RuleError::EmptyTag))
        ));
        assert_eq!(router.remove_rule("missing").unwrap(), 0);
        assert_eq!(router.version(), 1);

        assert_eq!(router.remove_rule("ads").unwrap(), 1);
        assert_eq!(router.rule_tags(), vec!["web"]);
        assert_eq!(router.config().rules.len(), 1);
        assert_eq!(router.version(), 2);
    }

    #[test]
    fn test_untagged_rules_never_collide() {
        let config = RouterConfig {
            rules: vec![RuleConfig::to_outbound("", "direct").with_port("80")],
            ..RouterConfig::default()
        };
        let (router, _) = router_with(&config);
        router.reload_rules(&config).unwrap();
        assert_eq!(router.rule_count(), 2);
        assert!(router.rule_tags().is_empty());
        assert!(!router.rule_exists(""));
    }
}
