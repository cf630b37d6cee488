// ────────────────────────────────
// src/server/builder.rs
// ────────────────────────────────
use super::dispatcher::{LoadBalancer, LoadBalancerError};
use super::handler::{ConnectionHandler, TcpRelayHandler};
use crate::config::Config;
use crate::health::{HealthMonitor, HealthProbe, ServerHealthState, TcpProbe};
use crate::load_balancer::create_strategy;
use crate::metrics::MetricsCollector;
use crate::proxy::BackendList;
use std::sync::Arc;

/// Builder pattern so `main.rs` (or a test) can inject the relay handler,
/// the probe and metrics.
pub struct LoadBalancerBuilder {
    config: Config,
    handler: Option<Arc<dyn ConnectionHandler>>,
    probe: Option<Arc<dyn HealthProbe>>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl LoadBalancerBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handler: None,
            probe: None,
            metrics: None,
        }
    }

    /// Replace the default byte relay.
    pub fn with_handler(mut self, handler: Arc<dyn ConnectionHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Replace the default TCP connect probe.
    pub fn with_probe(mut self, probe: Arc<dyn HealthProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validate the config and wire the dispatcher together. Fails on an
    /// empty or malformed backend list, before anything is bound.
    pub fn build(self) -> Result<LoadBalancer, LoadBalancerError> {
        self.config.validate()?;

        let backends = BackendList::new(self.config.backends.clone());
        let strategy = create_strategy(self.config.strategy, backends.clone())?;
        let state = Arc::new(ServerHealthState::new());
        let probe: Arc<dyn HealthProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(TcpProbe::new()),
        };
        let handler: Arc<dyn ConnectionHandler> = match self.handler {
            Some(handler) => handler,
            None => Arc::new(TcpRelayHandler::new()),
        };

        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(backends.len(), backends.len());
        }

        let monitor = Arc::new(HealthMonitor::new(
            self.config.health_check.clone(),
            backends.clone(),
            state.clone(),
            probe,
            self.metrics.clone(),
        ));

        Ok(LoadBalancer::new(
            self.config,
            backends,
            strategy,
            state,
            monitor,
            handler,
            self.metrics,
        ))
    }
}
