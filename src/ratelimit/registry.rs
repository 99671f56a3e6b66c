//! Per-route limiter registry.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use super::clock::Clock;
use super::limiter::RateLimiter;
use super::rules::RateLimitRules;
use super::store::StoreKind;
use super::window::Timestamp;
use crate::error::Result;

/// Name reported for requests that match no route.
pub const DEFAULT_ROUTE: &str = "default";

/// One limiter per configured route plus a default limiter.
///
/// Every limiter has its own store, so exhausting one route's quota never
/// affects another route.
pub struct LimiterRegistry {
    rules: RateLimitRules,
    default: RateLimiter,
    routes: HashMap<String, RateLimiter>,
    clock: Arc<dyn Clock>,
}

impl LimiterRegistry {
    /// Build limiters for every rule. Fails on the first invalid quota.
    pub fn from_rules(rules: RateLimitRules, store: StoreKind, clock: Arc<dyn Clock>) -> Result<Self> {
        rules.validate()?;

        let default = RateLimiter::with_store(rules.default.quota()?, store.build(), clock.clone());

        let mut routes = HashMap::with_capacity(rules.routes.len());
        for route in &rules.routes {
            let quota = route.limit.quota()?;
            debug!(
                route = %route.name,
                path_prefix = %route.path_prefix,
                max_requests = quota.max_requests(),
                window_ms = quota.window_ms(),
                "Creating route limiter"
            );
            routes.insert(
                route.name.clone(),
                RateLimiter::with_store(quota, store.build(), clock.clone()),
            );
        }

        info!(routes = routes.len(), store = ?store, "Rate limiter registry initialized");

        Ok(Self {
            rules,
            default,
            routes,
            clock,
        })
    }

    /// Pick the limiter for a request path, returning the route name with it.
    pub fn resolve(&self, path: &str) -> (&str, &RateLimiter) {
        self.rules
            .match_route(path)
            .and_then(|route| {
                self.routes
                    .get(&route.name)
                    .map(|limiter| (route.name.as_str(), limiter))
            })
            .unwrap_or((DEFAULT_ROUTE, &self.default))
    }

    /// Look up a limiter by route name.
    pub fn get(&self, name: &str) -> Option<&RateLimiter> {
        if name == DEFAULT_ROUTE {
            return Some(&self.default);
        }
        self.routes.get(name)
    }

    /// Sweep expired windows from every limiter.
    pub fn sweep_all(&self, now: Timestamp) -> usize {
        self.limiters().map(|limiter| limiter.sweep(now)).sum()
    }

    /// Total tracked keys across all limiters.
    pub fn counter_count(&self) -> usize {
        self.limiters().map(RateLimiter::counter_count).sum()
    }

    /// Number of limiters, including the default.
    pub fn limiter_count(&self) -> usize {
        self.routes.len() + 1
    }

    /// The shared time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn limiters(&self) -> impl Iterator<Item = &RateLimiter> {
        std::iter::once(&self.default).chain(self.routes.values())
    }
}
