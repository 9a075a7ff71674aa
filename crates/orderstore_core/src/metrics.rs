//! Outcome counters for order operations.
//!
//! # Responsibility
//! - Define the counter names the service reports.
//! - Provide a sink trait so callers choose where counts go.
//!
//! # Invariants
//! - Every service call increments exactly one `<op>.count` and one of
//!   `<op>.ok` / `<op>.error`.

use log::debug;
use parking_lot::Mutex;
use std::collections::BTreeMap;

pub const GET_ORDERS_SUCCESS: &str = "get_orders.ok";
pub const GET_ORDERS_ERROR: &str = "get_orders.error";
pub const GET_ORDERS_COUNT: &str = "get_orders.count";

pub const SAVE_ORDER_SUCCESS: &str = "save_order.ok";
pub const SAVE_ORDER_ERROR: &str = "save_order.error";
pub const SAVE_ORDER_COUNT: &str = "save_order.count";

/// Destination for outcome counters.
pub trait MetricsSink {
    fn increment(&self, counter: &'static str);
}

impl<T: MetricsSink + ?Sized> MetricsSink for &T {
    fn increment(&self, counter: &'static str) {
        (**self).increment(counter);
    }
}

impl<T: MetricsSink + ?Sized> MetricsSink for std::sync::Arc<T> {
    fn increment(&self, counter: &'static str) {
        (**self).increment(counter);
    }
}

/// Discards every increment.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _counter: &'static str) {}
}

/// Thread-safe in-process counters.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    counters: Mutex<BTreeMap<&'static str, u64>>,
}

impl InMemoryMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `counter` (0 if never incremented).
    pub fn count(&self, counter: &str) -> u64 {
        self.counters.lock().get(counter).copied().unwrap_or(0)
    }

    /// Snapshot of all non-zero counters, sorted by name.
    pub fn snapshot(&self) -> Vec<(&'static str, u64)> {
        self.counters
            .lock()
            .iter()
            .map(|(name, count)| (*name, *count))
            .collect()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn increment(&self, counter: &'static str) {
        let count = {
            let mut counters = self.counters.lock();
            let entry = counters.entry(counter).or_insert(0);
            *entry += 1;
            *entry
        };
        debug!("event=counter module=metrics name={counter} count={count}");
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryMetrics, MetricsSink, SAVE_ORDER_COUNT, SAVE_ORDER_SUCCESS};

    #[test]
    fn counters_start_at_zero_and_increment() {
        let metrics = InMemoryMetrics::new();
        assert_eq!(metrics.count(SAVE_ORDER_COUNT), 0);

        metrics.increment(SAVE_ORDER_COUNT);
        metrics.increment(SAVE_ORDER_COUNT);
        metrics.increment(SAVE_ORDER_SUCCESS);

        assert_eq!(metrics.count(SAVE_ORDER_COUNT), 2);
        assert_eq!(
            metrics.snapshot(),
            vec![(SAVE_ORDER_COUNT, 2), (SAVE_ORDER_SUCCESS, 1)]
        );
    }

    #[test]
    fn borrowed_sink_forwards_increments() {
        let metrics = InMemoryMetrics::new();
        let borrowed = &metrics;
        borrowed.increment(SAVE_ORDER_SUCCESS);
        assert_eq!(metrics.count(SAVE_ORDER_SUCCESS), 1);
    }
}
