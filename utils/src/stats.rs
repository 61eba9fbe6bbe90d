//! Named event counters for adapter scans.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters fixed at construction and bumped without locking.
///
/// Names outside the construction set are ignored.
#[derive(Debug)]
pub struct StatsCounter {
    slots: Box<[(&'static str, AtomicU64)]>,
}

impl StatsCounter {
    pub fn new(names: &[&'static str]) -> Self {
        Self {
            slots: names.iter().map(|&n| (n, AtomicU64::new(0))).collect(),
        }
    }

    fn slot(&self, name: &str) -> Option<&AtomicU64> {
        self.slots.iter().find(|(n, _)| *n == name).map(|(_, c)| c)
    }

    pub fn increment(&self, name: &str) {
        if let Some(counter) = self.slot(name) {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn get(&self, name: &str) -> u64 {
        self.slot(name).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// `(name, count)` pairs in construction order.
    pub fn counts(&self) -> Vec<(&'static str, u64)> {
        self.slots
            .iter()
            .map(|(n, c)| (*n, c.load(Ordering::Relaxed)))
            .collect()
    }
}
