//! Configuration Module
//!
//! Expiration and bookkeeping options shared by every cache flavour.

use std::env;
use std::time::Duration;

/// Default interval between two expiration sweeps.
pub const DEFAULT_EXPIRATION_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Cache configuration parameters.
///
/// A zero duration disables the corresponding policy. Options are fixed for
/// the lifetime of a cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// Expire entries this long after they were last read or written
    pub expire_after_access: Duration,
    /// Expire entries this long after they were last written
    pub expire_after_write: Duration,
    /// Remove expired entries instead of only hiding them from reads
    pub delete_on_expiration: bool,
    /// Delay between sweeps; zero means entries are only expired on read
    pub expiration_interval: Duration,
    /// Whether hit/miss/load/expire counters are maintained
    pub record_stats: bool,
}

impl CacheOptions {
    /// Creates options by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_EXPIRE_AFTER_ACCESS_MS` - Access expiry in ms (default: 0, disabled)
    /// - `CACHE_EXPIRE_AFTER_WRITE_MS` - Write expiry in ms (default: 0, disabled)
    /// - `CACHE_DELETE_ON_EXPIRATION` - Remove expired entries (default: true)
    /// - `CACHE_EXPIRATION_INTERVAL_MS` - Sweep interval in ms (default: 300000)
    /// - `CACHE_RECORD_STATS` - Maintain statistics (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            expire_after_access: env_millis("CACHE_EXPIRE_AFTER_ACCESS_MS")
                .unwrap_or(defaults.expire_after_access),
            expire_after_write: env_millis("CACHE_EXPIRE_AFTER_WRITE_MS")
                .unwrap_or(defaults.expire_after_write),
            delete_on_expiration: env::var("CACHE_DELETE_ON_EXPIRATION")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.delete_on_expiration),
            expiration_interval: env_millis("CACHE_EXPIRATION_INTERVAL_MS")
                .unwrap_or(defaults.expiration_interval),
            record_stats: env::var("CACHE_RECORD_STATS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.record_stats),
        }
    }

    /// Returns true if any expiration policy is enabled.
    pub fn expires(&self) -> bool {
        !self.expire_after_access.is_zero() || !self.expire_after_write.is_zero()
    }
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            expire_after_access: Duration::ZERO,
            expire_after_write: Duration::ZERO,
            delete_on_expiration: true,
            expiration_interval: DEFAULT_EXPIRATION_INTERVAL,
            record_stats: true,
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
}
