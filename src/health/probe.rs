// src/health/probe.rs
use crate::proxy::BackendAddress;
use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tracing::debug;

/// One-shot reachability check against a backend.
///
/// Implementations must return within roughly `timeout` and never fail: an
/// unreachable backend is simply `false`.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    async fn probe(&self, addr: &BackendAddress, timeout: Duration) -> bool;
}

/// Opens and immediately closes a TCP connection to the backend port.
#[derive(Debug, Clone, Default)]
pub struct TcpProbe;

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }

    // Tries every resolved address in turn, so a dual-stack name still
    // reaches a backend that listens on only one family.
    async fn connect(addr: &BackendAddress) -> std::io::Result<()> {
        let stream = TcpStream::connect((addr.host(), addr.port())).await?;
        drop(stream);
        Ok(())
    }
}

#[async_trait]
impl HealthProbe for TcpProbe {
    async fn probe(&self, addr: &BackendAddress, limit: Duration) -> bool {
        match timeout(limit, Self::connect(addr)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(backend = %addr, error = %e, "probe failed");
                false
            }
            Err(_) => {
                debug!(backend = %addr, "probe timed out after {:?}", limit);
                false
            }
        }
    }
}
