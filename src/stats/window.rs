//! Fixed-capacity ring of block timestamps.

use std::time::{Duration, Instant};

/// Ring buffer answering "how many events in the trailing window".
///
/// Memory is fixed at construction. Once full, each new event overwrites
/// the oldest slot; counting filters by age, so stale entries simply stop
/// being counted.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    slots: Box<[Option<Instant>]>,
    next: usize,
}

impl RollingWindow {
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "rolling window capacity must be non-zero");
        Self {
            slots: vec![None; capacity].into_boxed_slice(),
            next: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Record an event at `at`.
    pub fn record(&mut self, at: Instant) {
        self.slots[self.next] = Some(at);
        self.next = (self.next + 1) % self.slots.len();
    }

    /// Count events strictly younger than `window` as of `now`.
    ///
    /// An event exactly `window` old is not counted.
    pub fn count_within(&self, now: Instant, window: Duration) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|at| now.saturating_duration_since(**at) < window)
            .count()
    }
}
