use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters updated on every register operation.
pub struct StatsCounter {
    registrations: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    releases: AtomicU64,
}

impl StatsCounter {
    pub fn new() -> Self {
        StatsCounter {
            registrations: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            releases: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn record_registration(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_release(&self, count: u64) {
        self.releases.fetch_add(count, Ordering::Relaxed);
    }

    /// Returns a point-in-time snapshot of the statistics.
    pub fn snapshot(&self, live: usize) -> Metrics {
        Metrics {
            registrations: self.registrations.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            live,
        }
    }
}

impl Default for StatsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A point-in-time snapshot of register statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    /// Objects registered since the register was built.
    pub registrations: u64,
    /// Lookups that resolved to a valid object of the expected type.
    pub hits: u64,
    /// Lookups that found nothing, the wrong type, or an invalid entry.
    pub misses: u64,
    /// Entries destroyed (disposed and erased) for any reason.
    pub releases: u64,
    /// Entries currently in the map, valid or not.
    pub live: usize,
}

impl Metrics {
    pub fn lookup_count(&self) -> u64 {
        self.hits + self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = StatsCounter::new();
        stats.record_registration();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        stats.record_release(3);

        let m = stats.snapshot(4);
        assert_eq!(m.registrations, 1);
        assert_eq!(m.lookup_count(), 3);
        assert_eq!(m.releases, 3);
        assert_eq!(m.live, 4);
    }
}
