// src/load_balancer/mod.rs
mod algorithm;
mod random;
mod round_robin;

pub use algorithm::{create_strategy, SelectionStrategy, StrategyError};
pub use random::RandomStrategy;
pub use round_robin::RoundRobinStrategy;
pub use crate::config::StrategyKind;
