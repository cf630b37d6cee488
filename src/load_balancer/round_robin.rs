// src/load_balancer/round_robin.rs
use crate::proxy::{BackendAddress, BackendList};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cycles through the backends in configured order.
///
/// Concurrent callers share one atomic cursor: every call gets a valid
/// backend, but interleaved callers may see the cycle out of strict order.
#[derive(Debug)]
pub struct RoundRobinStrategy {
    backends: BackendList,
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    /// `backends` must be non-empty; see [`super::create_strategy`].
    pub(super) fn new(backends: BackendList) -> Self {
        Self {
            backends,
            counter: AtomicUsize::new(0),
        }
    }

    pub fn select(&self) -> BackendAddress {
        let len = self.backends.len();
        // Keep the cursor itself in range so it never wraps at usize::MAX
        // into a different position of the cycle.
        let index = self
            .counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |i| Some((i + 1) % len))
            .unwrap_or_default();
        self.backends.as_slice()[index % len].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn backends(count: u16) -> BackendList {
        BackendList::new(
            (0..count)
                .map(|i| BackendAddress::new("127.0.0.1", 8050 + i))
                .collect(),
        )
    }

    #[test]
    fn cycles_in_order() {
        let rr = RoundRobinStrategy::new(backends(2));
        assert_eq!(rr.select().port(), 8050);
        assert_eq!(rr.select().port(), 8051);
        assert_eq!(rr.select().port(), 8050);
    }

    #[test]
    fn concurrent_callers_always_get_a_configured_backend() {
        let list = backends(3);
        let rr = Arc::new(RoundRobinStrategy::new(list.clone()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let rr = rr.clone();
                std::thread::spawn(move || (0..1000).map(|_| rr.select()).collect::<Vec<_>>())
            })
            .collect();

        let mut total = 0;
        for h in handles {
            for addr in h.join().unwrap() {
                assert!(list.contains(&addr));
                total += 1;
            }
        }
        assert_eq!(total, 8000);
    }

    proptest! {
        #[test]
        fn sequential_calls_wrap_every_k(k in 1u16..12, n in 0usize..100) {
            let list = backends(k);
            let rr = RoundRobinStrategy::new(list.clone());
            for call in 0..n {
                let expected = list.get(call % k as usize).unwrap();
                prop_assert_eq!(&rr.select(), expected);
            }
        }
    }
}
