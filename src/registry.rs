//! Concurrent map from message text to its duplicate counter.
//!
//! The registry is the only shared mutable state of a filter. Callers increment
//! counters from arbitrary threads while the scheduler worker decays and evicts
//! them; every mutation of a single counter is one atomic operation so no
//! increment is ever lost.

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

const INITIAL_CAPACITY: usize = 1024;

/// Live duplicate count for one exact message.
#[derive(Debug, Default)]
pub struct Counter {
    count: AtomicI64,
}

impl Counter {
    /// Add one and report whether this call produced exactly `threshold`.
    ///
    /// `fetch_add` hands every caller a distinct post-increment value, so only
    /// one caller can observe the crossing for a given climb to the threshold.
    fn increment(&self, threshold: i64) -> Increment {
        let count = self.count.fetch_add(1, Ordering::AcqRel) + 1;
        Increment { count, crossed_threshold: count == threshold }
    }

    fn decay(&self, amount: i64) {
        self.count.fetch_sub(amount, Ordering::AcqRel);
    }

    /// Current value.
    pub fn get(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }
}

/// Result of a single counter increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    /// Post-increment count.
    pub count: i64,
    /// True for the one call whose increment landed exactly on the threshold.
    pub crossed_threshold: bool,
}

/// Outcome of one decay pass over the registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecaySummary {
    /// Entries looked at.
    pub visited: usize,
    /// Entries whose count was lowered.
    pub decayed: usize,
    /// Entries dropped because their count reached zero or below.
    pub removed: usize,
}

/// Message counters keyed by exact message text.
#[derive(Debug)]
pub struct Registry {
    entries: DashMap<String, Counter>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { entries: DashMap::with_capacity(INITIAL_CAPACITY) }
    }

    /// Increment the counter for `message`, creating it at zero first if absent.
    ///
    /// Existing keys only take a shard read lock; the key is allocated and the
    /// shard write-locked only the first time a message is seen. Insertion never
    /// replaces an entry created concurrently by another caller.
    pub fn increment(&self, message: &str, threshold: u32) -> Increment {
        let threshold = i64::from(threshold);
        if let Some(counter) = self.entries.get(message) {
            return counter.increment(threshold);
        }
        self.entries.entry(message.to_owned()).or_default().increment(threshold)
    }

    /// Apply one decay step to every entry.
    ///
    /// Entries above `threshold` are left alone, they are waiting for their
    /// eviction. Entries at zero or below are removed. Everything else loses
    /// `amount`.
    pub fn decay(&self, threshold: u32, amount: u32) -> DecaySummary {
        let threshold = i64::from(threshold);
        let amount = i64::from(amount);
        let mut summary = DecaySummary::default();
        self.entries.retain(|_, counter| {
            summary.visited += 1;
            let current = counter.get();
            if current > threshold {
                true
            } else if current <= 0 {
                summary.removed += 1;
                false
            } else {
                counter.decay(amount);
                summary.decayed += 1;
                true
            }
        });
        summary
    }

    /// Remove the entry for `message`. Returns whether one was present.
    pub fn remove(&self, message: &str) -> bool {
        self.entries.remove(message).is_some()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Current count for `message`, `None` when untracked (effectively zero).
    pub fn count(&self, message: &str) -> Option<i64> {
        self.entries.get(message).map(|counter| counter.get())
    }

    /// Number of tracked messages.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no message is tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of all counters sorted by message.
    pub fn snapshot(&self) -> Vec<(String, i64)> {
        let mut entries: Vec<(String, i64)> =
            self.entries.iter().map(|e| (e.key().clone(), e.value().get())).collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    #[test]
    fn counts_start_at_one_and_climb() {
        let registry = Registry::new();
        for n in 1..=5 {
            let step = registry.increment("boom", 10);
            assert_eq!(step.count, n);
            assert!(!step.crossed_threshold);
        }
        assert_eq!(registry.count("boom"), Some(5));
        assert_eq!(registry.count("other"), None);
    }

    #[test]
    fn keys_are_exact() {
        let registry = Registry::new();
        registry.increment("Disk full", 10);
        registry.increment("disk full", 10);
        registry.increment("Disk full ", 10);
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn only_exact_threshold_reports_crossing() {
        let registry = Registry::new();
        let crossings: Vec<i64> = (0..6)
            .map(|_| registry.increment("m", 3))
            .filter(|step| step.crossed_threshold)
            .map(|step| step.count)
            .collect();
        assert_eq!(crossings, vec![3]);
    }

    #[test]
    fn decay_lowers_removes_and_skips_above_threshold() {
        let registry = Registry::new();
        for _ in 0..3 {
            registry.increment("low", 5);
        }
        for _ in 0..6 {
            registry.increment("high", 5);
        }
        for _ in 0..5 {
            registry.increment("edge", 5);
        }

        let summary = registry.decay(5, 2);
        assert_eq!(summary, DecaySummary { visited: 3, decayed: 2, removed: 0 });
        assert_eq!(registry.count("low"), Some(1));
        assert_eq!(registry.count("high"), Some(6));
        // exactly at threshold is still decayed
        assert_eq!(registry.count("edge"), Some(3));

        registry.decay(5, 2);
        assert_eq!(registry.count("low"), Some(-1));

        let summary = registry.decay(5, 2);
        assert_eq!(summary.removed, 1);
        assert_eq!(registry.count("low"), None);
    }

    #[test]
    fn remove_and_clear() {
        let registry = Registry::new();
        registry.increment("a", 2);
        registry.increment("b", 2);
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert_eq!(registry.snapshot(), vec![("b".to_string(), 1)]);
        registry.clear();
        assert!(registry.is_empty());
    }

    #[test]
    fn concurrent_increments_yield_every_value_once() {
        const THREADS: usize = 32;
        let registry = Arc::new(Registry::new());
        let barrier = Arc::new(Barrier::new(THREADS));

        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.increment("storm", 16)
                })
            })
            .collect();

        let steps: Vec<Increment> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let counts: HashSet<i64> = steps.iter().map(|s| s.count).collect();
        assert_eq!(counts, (1..=THREADS as i64).collect::<HashSet<_>>());
        assert_eq!(steps.iter().filter(|s| s.crossed_threshold).count(), 1);
        assert_eq!(registry.count("storm"), Some(THREADS as i64));
    }
}
