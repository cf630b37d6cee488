// ────────────────────────────────
// src/server/listener.rs
// Encapsulates low‑level TCP bind so the dispatcher only sees a listener.
// ────────────────────────────────
use super::LoadBalancerError;
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub async fn bind_tcp(addr: SocketAddr) -> Result<TcpListener, LoadBalancerError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| LoadBalancerError::Bind { addr, source })
}
