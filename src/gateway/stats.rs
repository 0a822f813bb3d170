//! Gateway request counters.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Thread-safe gateway statistics
#[derive(Debug, Default)]
pub struct GatewayStats {
    /// Calls that reached the network
    requests: AtomicU64,
    /// HTTP attempts, retries included
    attempts: AtomicU64,
    /// Calls shed by the in-flight ceiling
    shed: AtomicU64,
    /// Calls skipped because the profile is not callable
    skipped: AtomicU64,
    /// Calls that ended empty after every attempt
    failures: AtomicU64,
    /// Requests currently running
    in_flight: AtomicUsize,
}

/// Point-in-time copy of [`GatewayStats`]
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct GatewayStatsSnapshot {
    /// Calls that reached the network
    pub requests: u64,
    /// HTTP attempts, retries included
    pub attempts: u64,
    /// Calls shed by the in-flight ceiling
    pub shed: u64,
    /// Calls skipped because the profile is not callable
    pub skipped: u64,
    /// Calls that ended empty
    pub failures: u64,
    /// Requests currently running
    pub in_flight: usize,
}

impl GatewayStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take an in-flight slot; `None` when `max` are already taken.
    pub(crate) fn try_acquire(&self, max: usize) -> Option<InFlightGuard<'_>> {
        let mut current = self.in_flight.load(Ordering::Acquire);
        loop {
            if current >= max {
                self.shed.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            match self.in_flight.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.requests.fetch_add(1, Ordering::Relaxed);
                    return Some(InFlightGuard { stats: self });
                },
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn record_attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Requests currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Get snapshot of current stats
    pub fn snapshot(&self) -> GatewayStatsSnapshot {
        GatewayStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            attempts: self.attempts.load(Ordering::Relaxed),
            shed: self.shed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}

/// Releases an in-flight slot on drop.
#[derive(Debug)]
pub(crate) struct InFlightGuard<'a> {
    stats: &'a GatewayStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_released_on_drop() {
        let stats = GatewayStats::new();
        let first = stats.try_acquire(2);
        let second = stats.try_acquire(2);
        assert!(first.is_some() && second.is_some());
        assert!(stats.try_acquire(2).is_none());
        assert_eq!(stats.in_flight(), 2);

        drop(first);
        assert_eq!(stats.in_flight(), 1);
        assert!(stats.try_acquire(2).is_some());

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 3);
        assert_eq!(snapshot.shed, 1);
    }
}
