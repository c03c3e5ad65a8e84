use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::content::{ContentFetcher, SpecializedHandlerRegistry};
use crate::rate_limiter::RateLimiter;
use crate::registry::SourceRegistry;
use crate::update::UpdateController;

/// The explicit context object threaded through the call graph in place
/// of the original's module-level singletons (session pool,
/// circuit-breaker pool, rate-limiter pool, performance monitor).
/// Constructed once at process start; per-source rate buckets and
/// circuit breakers live here and persist for the lifetime of the
/// `Runtime`, matching the data model's "process-wide, reset at process
/// start" lifecycle note.
pub struct Runtime {
    pub client: reqwest::Client,
    pub config: Config,
    pub registry: SourceRegistry,
    pub specialized_handlers: SpecializedHandlerRegistry,
    pub content_fetcher: Box<dyn ContentFetcher>,
    pub update_controller: UpdateController,
    rate_limiters: RwLock<HashMap<String, Arc<RateLimiter>>>,
    circuit_breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl Runtime {
    pub fn new(
        config: Config,
        registry: SourceRegistry,
        content_fetcher: Box<dyn ContentFetcher>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs_f64(config.connect_timeout_seconds))
            .pool_max_idle_per_host(config.pool_maxsize)
            .user_agent("capcat/1.0")
            .build()
            .expect("failed to build http client");

        let mut rate_limiters = HashMap::new();
        let mut circuit_breakers = HashMap::new();
        for descriptor in registry.all() {
            let rl_spec = config.rate_limit_for(&descriptor.source_id);
            rate_limiters.insert(
                descriptor.source_id.clone(),
                Arc::new(RateLimiter::new(rl_spec)),
            );

            let cb_spec = config.circuit_breaker_for(&descriptor.source_id);
            circuit_breakers.insert(
                descriptor.source_id.clone(),
                Arc::new(CircuitBreaker::new(descriptor.source_id.clone(), cb_spec)),
            );
        }
        rate_limiters
            .entry("default".to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(config.rate_limit_for("default"))));
        circuit_breakers.entry("default".to_string()).or_insert_with(|| {
            Arc::new(CircuitBreaker::new(
                "default",
                config.circuit_breaker_for("default"),
            ))
        });

        let update_controller = UpdateController::new(client.clone());

        Self {
            client,
            config,
            registry,
            specialized_handlers: SpecializedHandlerRegistry::new(),
            content_fetcher,
            update_controller,
            rate_limiters: RwLock::new(rate_limiters),
            circuit_breakers: RwLock::new(circuit_breakers),
        }
    }

    /// Lazy accessor: a source absent from the registry at construction
    /// time (e.g. a custom source registered after the fact) gets its
    /// own bucket here the first time it's asked for, seeded from the
    /// config's per-source override (or the `default` spec if none is
    /// set). It never falls back to sharing the `default` instance, so
    /// one source's failures can't trip another source's breaker.
    pub fn rate_limiter(&self, source_id: &str) -> Arc<RateLimiter> {
        if let Some(existing) = self.rate_limiters.read().unwrap().get(source_id) {
            return existing.clone();
        }
        self.rate_limiters
            .write()
            .unwrap()
            .entry(source_id.to_string())
            .or_insert_with(|| Arc::new(RateLimiter::new(self.config.rate_limit_for(source_id))))
            .clone()
    }

    pub fn circuit_breaker(&self, source_id: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.circuit_breakers.read().unwrap().get(source_id) {
            return existing.clone();
        }
        self.circuit_breakers
            .write()
            .unwrap()
            .entry(source_id.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    source_id.to_string(),
                    self.config.circuit_breaker_for(source_id),
                ))
            })
            .clone()
    }
}
