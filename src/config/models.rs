// src/config/models.rs
use crate::proxy::{AddressParseError, BackendAddress};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

pub const DEFAULT_LISTEN_PORT: u16 = 8080;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    pub backends: Vec<BackendAddress>,

    #[serde(default)]
    pub strategy: StrategyKind,

    #[serde(default)]
    pub health_check: HealthCheckConfig,

    #[serde(default = "default_buffer_size")]
    pub buffer_size_bytes: usize,

    #[serde(default)]
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    #[default]
    RoundRobin,
    Random,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default = "default_probe_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_probe_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_metrics_port")]
    pub port: u16,

    #[serde(default = "default_metrics_path")]
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("at least one backend must be configured")]
    NoBackends,

    #[error("backend {0} is listed more than once")]
    DuplicateBackend(BackendAddress),

    #[error(transparent)]
    InvalidBackend(#[from] AddressParseError),

    #[error("buffer_size_bytes must be greater than zero")]
    ZeroBufferSize,

    #[error("health_check.{0} must be greater than zero")]
    ZeroHealthCheckSetting(&'static str),

    #[error("metrics port {0} collides with the listen port")]
    MetricsPortCollision(u16),
}

fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}

fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_buffer_size() -> usize {
    128 * 1024
}

fn default_probe_interval_ms() -> u64 {
    15_000
}

fn default_probe_timeout_ms() -> u64 {
    500
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_probe_interval_ms(),
            timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
            path: default_metrics_path(),
        }
    }
}

impl Config {
    /// Config with defaults for everything but the listen port and backends.
    pub fn new(listen_port: u16, backends: Vec<BackendAddress>) -> Self {
        Self {
            listen_port,
            bind_address: default_bind_address(),
            backends,
            strategy: StrategyKind::default(),
            health_check: HealthCheckConfig::default(),
            buffer_size_bytes: default_buffer_size(),
            metrics: MetricsConfig::default(),
        }
    }

    /// Build a config from the `<LISTEN_PORT> <HOST:PORT,...>` command line.
    ///
    /// A port that does not parse falls back to the default with a warning;
    /// a backend that does not parse is an error.
    pub fn from_args(port: &str, servers: &str) -> Result<Self, ConfigError> {
        let listen_port = port.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid port: {}, using {}", port, DEFAULT_LISTEN_PORT);
            DEFAULT_LISTEN_PORT
        });

        let backends = servers
            .split(',')
            .filter(|s| !s.trim().is_empty())
            .map(str::parse)
            .collect::<Result<Vec<BackendAddress>, _>>()?;

        let config = Self::new(listen_port, backends);
        config.validate()?;
        Ok(config)
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.listen_port)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backends.is_empty() {
            return Err(ConfigError::NoBackends);
        }

        let mut seen = HashSet::new();
        for backend in &self.backends {
            if !seen.insert(backend) {
                return Err(ConfigError::DuplicateBackend(backend.clone()));
            }
        }

        if self.buffer_size_bytes == 0 {
            return Err(ConfigError::ZeroBufferSize);
        }
        if self.health_check.interval_ms == 0 {
            return Err(ConfigError::ZeroHealthCheckSetting("interval_ms"));
        }
        if self.health_check.timeout_ms == 0 {
            return Err(ConfigError::ZeroHealthCheckSetting("timeout_ms"));
        }
        if self.metrics.enabled && self.metrics.port == self.listen_port {
            return Err(ConfigError::MetricsPortCollision(self.metrics.port));
        }

        Ok(())
    }
}
