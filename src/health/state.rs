// src/health/state.rs
use crate::proxy::BackendAddress;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// Which backends are currently believed unreachable, and since when.
///
/// A backend with no entry is healthy. Entries are added by failed probes and
/// failed relays, and removed by successful probes. The map is sharded, so
/// readers on the accept path never queue behind a single global lock.
///
/// Individual calls are atomic; a check followed by a mutation is not.
/// Callers must tolerate a backend changing state in between.
#[derive(Debug, Default)]
pub struct ServerHealthState {
    unhealthy: DashMap<BackendAddress, DateTime<Utc>>,
}

impl ServerHealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_healthy(&self, addr: &BackendAddress) -> bool {
        !self.unhealthy.contains_key(addr)
    }

    /// Record `addr` as down at `at`. Returns true if it was healthy before.
    pub fn mark_unhealthy(&self, addr: &BackendAddress, at: DateTime<Utc>) -> bool {
        self.unhealthy.insert(addr.clone(), at).is_none()
    }

    /// Returns true if `addr` was unhealthy before.
    pub fn mark_healthy(&self, addr: &BackendAddress) -> bool {
        self.unhealthy.remove(addr).is_some()
    }

    pub fn unhealthy_count(&self) -> usize {
        self.unhealthy.len()
    }

    pub fn unhealthy_since(&self, addr: &BackendAddress) -> Option<DateTime<Utc>> {
        self.unhealthy.get(addr).map(|entry| *entry.value())
    }

    pub fn snapshot_unhealthy(&self) -> Vec<BackendAddress> {
        self.unhealthy
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}
