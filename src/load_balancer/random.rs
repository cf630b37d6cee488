// src/load_balancer/random.rs
use crate::proxy::{BackendAddress, BackendList};
use rand::Rng;

/// Picks a backend uniformly at random; keeps no state between calls.
#[derive(Debug)]
pub struct RandomStrategy {
    backends: BackendList,
}

impl RandomStrategy {
    pub(super) fn new(backends: BackendList) -> Self {
        Self { backends }
    }

    pub fn select(&self) -> BackendAddress {
        let index = rand::thread_rng().gen_range(0..self.backends.len());
        self.backends.as_slice()[index].clone()
    }
}
