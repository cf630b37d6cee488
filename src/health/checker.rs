// src/health/checker.rs
use super::probe::HealthProbe;
use super::state::ServerHealthState;
use crate::config::HealthCheckConfig;
use crate::metrics::MetricsCollector;
use crate::proxy::{BackendAddress, BackendList};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Keeps [`ServerHealthState`] in line with what the backends actually do.
///
/// A full sweep runs before the listener starts accepting and again whenever
/// the dispatcher finds every backend down. Between those, only backends
/// already marked unhealthy are re-probed, once per interval.
pub struct HealthMonitor {
    config: HealthCheckConfig,
    backends: BackendList,
    state: Arc<ServerHealthState>,
    probe: Arc<dyn HealthProbe>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl HealthMonitor {
    pub fn new(
        config: HealthCheckConfig,
        backends: BackendList,
        state: Arc<ServerHealthState>,
        probe: Arc<dyn HealthProbe>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        Self {
            config,
            backends,
            state,
            probe,
            metrics,
        }
    }

    /// Periodically re-probe unhealthy backends until `shutdown_rx` flips to
    /// true or its sender goes away.
    pub async fn start(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the first probe is one
        // interval after start.
        ticker.tick().await;

        info!(
            "Starting health monitor with interval: {:?}",
            self.config.interval()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_unhealthy_only().await;
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("Health monitor shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Probe every configured backend and apply each verdict.
    pub async fn probe_all(&self) {
        debug!("Probing all {} backends", self.backends.len());
        self.probe_each(self.backends.as_slice()).await;
    }

    /// Probe only the backends currently marked unhealthy.
    pub async fn probe_unhealthy_only(&self) {
        let unhealthy = self.state.snapshot_unhealthy();
        if unhealthy.is_empty() {
            debug!("No unhealthy backends to check");
            return;
        }

        debug!("Checking {} unhealthy backends", unhealthy.len());
        self.probe_each(&unhealthy).await;
    }

    async fn probe_each(&self, targets: &[BackendAddress]) {
        let timeout = self.config.timeout();
        let checks = targets.iter().map(|addr| self.check_backend(addr, timeout));
        futures::future::join_all(checks).await;

        let unhealthy = self.state.unhealthy_count();
        let total = self.backends.len();
        if let Some(metrics) = &self.metrics {
            metrics.update_backend_counts(total.saturating_sub(unhealthy), total);
        }
        debug!(
            "Health check complete: {} healthy, {} unhealthy",
            total.saturating_sub(unhealthy),
            unhealthy
        );
    }

    async fn check_backend(&self, addr: &BackendAddress, timeout: Duration) {
        let healthy = self.probe.probe(addr, timeout).await;

        if let Some(metrics) = &self.metrics {
            let label = addr.to_string();
            metrics.record_probe(&label, healthy);
            metrics.update_backend_health(&label, healthy);
        }

        if healthy {
            if self.state.mark_healthy(addr) {
                info!(backend = %addr, "Backend marked healthy");
            } else {
                debug!(backend = %addr, "Backend is healthy");
            }
        } else if self.state.mark_unhealthy(addr, Utc::now()) {
            warn!(backend = %addr, "Backend marked unhealthy: probe failed");
        } else {
            debug!(backend = %addr, "Backend still unhealthy");
        }
    }
}
