// ────────────────────────────────
// src/server/dispatcher.rs
// Accept loop: picks a healthy backend per connection and hands the socket
// to a relay task.
// ────────────────────────────────
use super::handler::ConnectionHandler;
use super::listener::bind_tcp;
use crate::config::{Config, ConfigError};
use crate::health::{HealthMonitor, ServerHealthState};
use crate::load_balancer::{SelectionStrategy, StrategyError};
use crate::metrics::MetricsCollector;
use crate::proxy::{BackendAddress, BackendList, RelayOutcome};
use chrono::Utc;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LoadBalancerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(#[source] io::Error),
}

/// The dispatcher. Owns the health state and shares it with the monitor and
/// with every relay completion.
pub struct LoadBalancer {
    config: Config,
    backends: BackendList,
    strategy: SelectionStrategy,
    state: Arc<ServerHealthState>,
    monitor: Arc<HealthMonitor>,
    handler: Arc<dyn ConnectionHandler>,
    metrics: Option<Arc<MetricsCollector>>,
    shutdown_tx: watch::Sender<bool>,
}

impl LoadBalancer {
    pub(super) fn new(
        config: Config,
        backends: BackendList,
        strategy: SelectionStrategy,
        state: Arc<ServerHealthState>,
        monitor: Arc<HealthMonitor>,
        handler: Arc<dyn ConnectionHandler>,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            backends,
            strategy,
            state,
            monitor,
            handler,
            metrics,
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn health_state(&self) -> Arc<ServerHealthState> {
        self.state.clone()
    }

    pub fn available_backends(&self) -> usize {
        self.backends
            .len()
            .saturating_sub(self.state.unhealthy_count())
    }

    /// Ask the accept loop and the health monitor to stop. Relays already
    /// running are left to finish on their own.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Bind the configured address and serve until shut down.
    pub async fn run(&self) -> Result<(), LoadBalancerError> {
        let listener = bind_tcp(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener. The listener is closed when this
    /// returns, whichever way it returns.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), LoadBalancerError> {
        match listener.local_addr() {
            Ok(addr) => info!(
                "Starting load balancer on {} ({}, {} backends)",
                addr,
                self.strategy.name(),
                self.backends.len()
            ),
            Err(e) => warn!(error = %e, "Starting load balancer on unknown address"),
        }

        // Find out which backends are down before taking any traffic.
        self.monitor.probe_all().await;
        info!(
            "{}/{} backends available",
            self.available_backends(),
            self.backends.len()
        );

        let monitor = tokio::spawn(self.monitor.clone().start(self.shutdown_tx.subscribe()));

        let result = self.accept_loop(&listener).await;
        if let Err(e) = &result {
            warn!(error = %e, "Accept loop failed");
        }

        self.shutdown();
        if let Err(e) = monitor.await {
            warn!(error = %e, "Health monitor task failed");
        }
        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<(), LoadBalancerError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                break;
            }

            if self.available_backends() == 0 {
                // Nothing to route to. Re-probe everything, then refuse the next
                // client regardless; a recovered backend serves the one after.
                warn!(
                    "all backends unhealthy: {} configured, probing all of them",
                    self.backends.len()
                );
                self.monitor.probe_all().await;

                if let Some((stream, peer)) = accept(listener, &mut shutdown_rx).await? {
                    warn!(%peer, "Rejected connection: no healthy backends");
                    if let Some(metrics) = &self.metrics {
                        metrics.record_rejection();
                    }
                    drop(stream);
                }
                continue;
            }

            let target = self.strategy.select_destination();
            if !self.state.is_healthy(&target) {
                // Ask the strategy again rather than spending an accept on a
                // backend that is known to be down.
                debug!(backend = %target, "Skipping unhealthy backend");
                tokio::task::yield_now().await;
                continue;
            }

            if let Some((stream, peer)) = accept(listener, &mut shutdown_rx).await? {
                self.dispatch(stream, peer, target);
            }
        }

        info!("Exit load balancer accept loop");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr, target: BackendAddress) {
        let connection_id = Uuid::new_v4();
        info!(%peer, backend = %target, %connection_id, "Routing connection");

        let span = info_span!("relay", %connection_id, %peer, backend = %target);
        let handler = self.handler.clone();
        let buffer_size = self.config.buffer_size_bytes;
        let relay_target = target.clone();
        let relay = tokio::spawn(
            async move { handler.handle(stream, relay_target, buffer_size).await }
                .instrument(span.clone()),
        );

        if let Some(metrics) = &self.metrics {
            metrics.increment_active_connections();
        }

        let state = self.state.clone();
        let metrics = self.metrics.clone();
        tokio::spawn(
            async move {
                let outcome = match relay.await {
                    Ok(outcome) => outcome,
                    Err(e) => RelayOutcome::Aborted(e.to_string()),
                };
                report_outcome(&state, metrics.as_deref(), &target, outcome);
            }
            .instrument(span),
        );
    }
}

/// Wait for the next client, or `None` if the stop signal changed first.
async fn accept(
    listener: &TcpListener,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> Result<Option<(TcpStream, SocketAddr)>, LoadBalancerError> {
    tokio::select! {
        accepted = listener.accept() => accepted.map(Some).map_err(LoadBalancerError::Accept),
        _ = shutdown_rx.changed() => Ok(None),
    }
}

/// Apply one relay outcome to the health state. Called exactly once per
/// dispatched connection.
fn report_outcome(
    state: &ServerHealthState,
    metrics: Option<&MetricsCollector>,
    target: &BackendAddress,
    outcome: RelayOutcome,
) {
    if let Some(metrics) = metrics {
        metrics.decrement_active_connections();
        metrics.record_connection(&target.to_string(), outcome.label());
    }

    if outcome.is_health_signal() {
        warn!(backend = %target, %outcome, "Taking backend offline");
        state.mark_unhealthy(target, Utc::now());
        if let Some(metrics) = metrics {
            metrics.update_backend_health(&target.to_string(), false);
        }
    } else {
        debug!(backend = %target, "Connection closed");
    }
}
