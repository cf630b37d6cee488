// src/load_balancer/algorithm.rs
use super::{RandomStrategy, RoundRobinStrategy};
use crate::config::StrategyKind;
use crate::proxy::{BackendAddress, BackendList};

/// Decides which backend the next connection goes to.
///
/// Selection ignores health on purpose: the dispatcher decides whether a
/// returned backend is admissible and asks again if it is not.
#[derive(Debug)]
pub enum SelectionStrategy {
    RoundRobin(RoundRobinStrategy),
    Random(RandomStrategy),
}

#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("cannot build a {0:?} strategy without backends")]
    NoBackends(StrategyKind),
}

impl SelectionStrategy {
    pub fn select_destination(&self) -> BackendAddress {
        match self {
            SelectionStrategy::RoundRobin(rr) => rr.select(),
            SelectionStrategy::Random(random) => random.select(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SelectionStrategy::RoundRobin(_) => "round_robin",
            SelectionStrategy::Random(_) => "random",
        }
    }
}

/// Build the strategy for `kind`. The backend list must be non-empty, which
/// makes `select_destination` infallible afterwards.
pub fn create_strategy(
    kind: StrategyKind,
    backends: BackendList,
) -> Result<SelectionStrategy, StrategyError> {
    if backends.is_empty() {
        return Err(StrategyError::NoBackends(kind));
    }

    Ok(match kind {
        StrategyKind::RoundRobin => SelectionStrategy::RoundRobin(RoundRobinStrategy::new(backends)),
        StrategyKind::Random => SelectionStrategy::Random(RandomStrategy::new(backends)),
    })
}
