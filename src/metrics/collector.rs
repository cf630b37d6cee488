// src/metrics/collector.rs
use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

pub struct MetricsRegistry {
    registry: Registry,
    collector: Arc<MetricsCollector>,
}

impl MetricsRegistry {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let collector = Arc::new(MetricsCollector::new(&registry)?);

        Ok(Self {
            registry,
            collector,
        })
    }

    pub fn collector(&self) -> Arc<MetricsCollector> {
        self.collector.clone()
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn gather(&self) -> Result<Vec<u8>> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(buffer)
    }
}

pub struct MetricsCollector {
    // Connection metrics
    pub connections_total: IntCounterVec,
    pub rejected_connections_total: IntCounter,
    pub active_connections: IntGauge,

    // Backend metrics
    pub backend_health_status: IntGaugeVec,
    pub probes_total: IntCounterVec,

    // System metrics
    pub healthy_backends: IntGauge,
    pub total_backends: IntGauge,
}

impl MetricsCollector {
    pub fn new(registry: &Registry) -> Result<Self> {
        let connections_total = IntCounterVec::new(
            Opts::new("lb_connections_total", "Relayed connections by outcome"),
            &["backend", "outcome"],
        )?;
        registry.register(Box::new(connections_total.clone()))?;

        let rejected_connections_total = IntCounter::new(
            "lb_rejected_connections_total",
            "Connections closed because no backend was healthy",
        )?;
        registry.register(Box::new(rejected_connections_total.clone()))?;

        let active_connections =
            IntGauge::new("lb_active_connections", "Connections currently being relayed")?;
        registry.register(Box::new(active_connections.clone()))?;

        let backend_health_status = IntGaugeVec::new(
            Opts::new(
                "lb_backend_health_status",
                "Backend health status (1=healthy, 0=unhealthy)",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(backend_health_status.clone()))?;

        let probes_total = IntCounterVec::new(
            Opts::new("lb_probes_total", "Health probes by result"),
            &["backend", "result"],
        )?;
        registry.register(Box::new(probes_total.clone()))?;

        let healthy_backends =
            IntGauge::new("lb_healthy_backends", "Number of healthy backends")?;
        registry.register(Box::new(healthy_backends.clone()))?;

        let total_backends =
            IntGauge::new("lb_total_backends", "Total number of backends")?;
        registry.register(Box::new(total_backends.clone()))?;

        Ok(Self {
            connections_total,
            rejected_connections_total,
            active_connections,
            backend_health_status,
            probes_total,
            healthy_backends,
            total_backends,
        })
    }

    pub fn record_connection(&self, backend: &str, outcome: &str) {
        self.connections_total
            .with_label_values(&[backend, outcome])
            .inc();
    }

    pub fn record_rejection(&self) {
        self.rejected_connections_total.inc();
    }

    pub fn record_probe(&self, backend: &str, healthy: bool) {
        let result = if healthy { "success" } else { "failure" };
        self.probes_total.with_label_values(&[backend, result]).inc();
    }

    pub fn update_backend_health(&self, backend: &str, healthy: bool) {
        let value = if healthy { 1 } else { 0 };
        self.backend_health_status
            .with_label_values(&[backend])
            .set(value);
    }

    pub fn increment_active_connections(&self) {
        self.active_connections.inc();
    }

    pub fn decrement_active_connections(&self) {
        self.active_connections.dec();
    }

    pub fn update_backend_counts(&self, healthy: usize, total: usize) {
        self.healthy_backends.set(healthy as i64);
        self.total_backends.set(total as i64);
    }
}
