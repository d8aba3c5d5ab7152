//! Metrics primitives
//!
//! Lock-free counters and gauges plus a bounded sample histogram. These
//! are plain values meant to live inside an explicit metrics context that
//! is constructed at startup and injected where needed.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter
#[derive(Clone, Default)]
pub struct Counter {
    value: Arc<AtomicU64>,
    name: String,
}

impl Counter {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Up/down gauge
#[derive(Clone, Default)]
pub struct Gauge {
    value: Arc<AtomicU64>,
    name: String,
}

impl Gauge {
    pub fn new(name: &str) -> Self {
        Self {
            value: Arc::new(AtomicU64::new(0)),
            name: name.to_string(),
        }
    }

    pub fn set(&self, val: u64) {
        self.value.store(val, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Retained samples per histogram; older samples are evicted first.
const HISTOGRAM_CAPACITY: usize = 10_000;

/// Sample histogram over a sliding window of observations
#[derive(Clone)]
pub struct Histogram {
    window: Arc<parking_lot::Mutex<VecDeque<f64>>>,
    name: String,
}

impl Histogram {
    pub fn new(name: &str) -> Self {
        Self {
            window: Arc::new(parking_lot::Mutex::new(VecDeque::new())),
            name: name.to_string(),
        }
    }

    pub fn record(&self, value: f64) {
        let mut window = self.window.lock();
        if window.len() == HISTOGRAM_CAPACITY {
            window.pop_front();
        }
        window.push_back(value);
    }

    pub fn count(&self) -> usize {
        self.window.lock().len()
    }

    /// The p-th percentile (0..=100) of the retained window, 0.0 when empty.
    pub fn percentile(&self, p: f64) -> f64 {
        let window = self.window.lock();
        if window.is_empty() {
            return 0.0;
        }
        let mut sorted: Vec<f64> = window.iter().copied().collect();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = ((sorted.len() as f64) * p / 100.0) as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn mean(&self) -> f64 {
        let window = self.window.lock();
        if window.is_empty() {
            return 0.0;
        }
        window.iter().sum::<f64>() / window.len() as f64
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter");
        assert_eq!(counter.get(), 0);
        counter.inc();
        assert_eq!(counter.get(), 1);
        counter.add(5);
        assert_eq!(counter.get(), 6);
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("test_gauge");
        gauge.set(10);
        assert_eq!(gauge.get(), 10);
        gauge.inc();
        assert_eq!(gauge.get(), 11);
        gauge.dec();
        assert_eq!(gauge.get(), 10);
    }

    #[test]
    fn test_histogram() {
        let hist = Histogram::new("test_histogram");
        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            hist.record(v);
        }

        assert_eq!(hist.count(), 5);
        assert!((hist.mean() - 3.0).abs() < 0.001);
        assert!((hist.percentile(50.0) - 3.0).abs() < 0.001);
        assert!((hist.percentile(100.0) - 5.0).abs() < 0.001);
    }

    #[test]
    fn test_empty_histogram() {
        let hist = Histogram::new("test_histogram");
        assert_eq!(hist.count(), 0);
        assert_eq!(hist.mean(), 0.0);
        assert_eq!(hist.percentile(99.0), 0.0);
    }
}
