//
// src/proxy/pool.rs
//

use super::backend::BackendAddress;
use std::sync::Arc;

/// The fixed, ordered set of backends for the lifetime of the process.
///
/// Cloning is cheap and shares the same underlying slice, so the dispatcher,
/// the strategy and the health monitor can each hold one without locking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendList {
    backends: Arc<[BackendAddress]>,
}

impl BackendList {
    pub fn new(backends: Vec<BackendAddress>) -> Self {
        Self {
            backends: backends.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&BackendAddress> {
        self.backends.get(index)
    }

    pub fn contains(&self, addr: &BackendAddress) -> bool {
        self.backends.contains(addr)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BackendAddress> {
        self.backends.iter()
    }

    pub fn as_slice(&self) -> &[BackendAddress] {
        &self.backends
    }
}

impl From<Vec<BackendAddress>> for BackendList {
    fn from(backends: Vec<BackendAddress>) -> Self {
        Self::new(backends)
    }
}

impl<'a> IntoIterator for &'a BackendList {
    type Item = &'a BackendAddress;
    type IntoIter = std::slice::Iter<'a, BackendAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
