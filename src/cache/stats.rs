//! Cache Statistics Module
//!
//! Named counters for hits, misses, loads and expirations.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

// == Stat Kind ==
/// The fixed set of counters a cache maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    Hit,
    Miss,
    LoadSuccess,
    LoadFailure,
    Expire,
}

impl StatKind {
    pub const ALL: [StatKind; 5] = [
        StatKind::Hit,
        StatKind::Miss,
        StatKind::LoadSuccess,
        StatKind::LoadFailure,
        StatKind::Expire,
    ];

    /// Stable counter name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Hit => "hit",
            StatKind::Miss => "miss",
            StatKind::LoadSuccess => "load_success",
            StatKind::LoadFailure => "load_failure",
            StatKind::Expire => "expire",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Cache Stats ==
/// Tracks cache performance counters.
///
/// Counters only grow, except through [`CacheStats::reset`]. Increments are
/// atomic so they can be recorded without holding the entry lock.
#[derive(Debug, Default)]
pub struct CacheStats {
    counters: [AtomicU64; 5],
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Increment ==
    /// Adds `delta` to a counter and returns its previous value.
    pub fn inc(&self, kind: StatKind, delta: u64) -> u64 {
        self.counters[kind.index()].fetch_add(delta, Ordering::Relaxed)
    }

    /// Current value of a counter.
    pub fn get(&self, kind: StatKind) -> u64 {
        self.counters[kind.index()].load(Ordering::Relaxed)
    }

    // == Reset ==
    /// Zeroes every counter. Stored entries are not touched.
    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }

    /// Copies the current counters into a plain, serializable value.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.get(StatKind::Hit),
            misses: self.get(StatKind::Miss),
            load_successes: self.get(StatKind::LoadSuccess),
            load_failures: self.get(StatKind::LoadFailure),
            expirations: self.get(StatKind::Expire),
        }
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.snapshot(), f)
    }
}

// == Stats Snapshot ==
/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub load_successes: u64,
    pub load_failures: u64,
    pub expirations: u64,
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        for kind in StatKind::ALL {
            assert_eq!(stats.get(kind), 0);
        }
    }

    #[test]
    fn test_inc_returns_previous() {
        let stats = CacheStats::new();
        assert_eq!(stats.inc(StatKind::Hit, 1), 0);
        assert_eq!(stats.inc(StatKind::Hit, 3), 1);
        assert_eq!(stats.get(StatKind::Hit), 4);
        assert_eq!(stats.get(StatKind::Miss), 0);
    }

    #[test]
    fn test_reset() {
        let stats = CacheStats::new();
        stats.inc(StatKind::Expire, 7);
        stats.inc(StatKind::LoadFailure, 2);
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats::new();
        assert_eq!(stats.snapshot().hit_rate(), 0.0);

        stats.inc(StatKind::Hit, 3);
        stats.inc(StatKind::Miss, 1);
        assert_eq!(stats.snapshot().hit_rate(), 0.75);
    }

    #[test]
    fn test_display_is_json() {
        let stats = CacheStats::new();
        stats.inc(StatKind::LoadSuccess, 2);

        let json: serde_json::Value = serde_json::from_str(&stats.to_string()).unwrap();
        assert_eq!(json["load_successes"], 2);
        assert_eq!(json["hits"], 0);
    }

    #[test]
    fn test_kind_names() {
        let names: Vec<_> = StatKind::ALL.iter().map(StatKind::as_str).collect();
        assert_eq!(names, ["hit", "miss", "load_success", "load_failure", "expire"]);
    }
}
