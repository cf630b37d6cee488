// src/health/mod.rs
mod checker;
mod probe;
mod state;

pub use checker::HealthMonitor;
pub use probe::{HealthProbe, TcpProbe};
pub use state::ServerHealthState;
