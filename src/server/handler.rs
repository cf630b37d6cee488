// src/server/handler.rs
use crate::proxy::{relay, BackendAddress, RelayOutcome};
use async_trait::async_trait;
use tokio::net::TcpStream;

/// Runs one accepted connection against its chosen backend.
///
/// The dispatcher spawns each call on its own task and turns the returned
/// outcome into a health update, so implementations can take as long as the
/// connection lives. Tests swap in their own handler to observe routing
/// without real backends.
#[async_trait]
pub trait ConnectionHandler: Send + Sync {
    async fn handle(
        &self,
        client: TcpStream,
        target: BackendAddress,
        buffer_size: usize,
    ) -> RelayOutcome;
}

/// Production handler: a byte relay to the backend.
#[derive(Debug, Clone, Default)]
pub struct TcpRelayHandler;

impl TcpRelayHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConnectionHandler for TcpRelayHandler {
    async fn handle(
        &self,
        client: TcpStream,
        target: BackendAddress,
        buffer_size: usize,
    ) -> RelayOutcome {
        relay(client, &target, buffer_size).await
    }
}
