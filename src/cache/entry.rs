//! Cache Entry Module
//!
//! A single cache slot with the access and write timestamps used to decide
//! expiration.

use tokio::time::Instant;

use crate::config::CacheOptions;

// == Cache Entry ==
/// A stored value plus the bookkeeping needed to expire it.
///
/// `write_time` only moves on [`CacheEntry::set_value`]. `access_time` moves on
/// every read of the key or value as well, so "expire after access" counts from
/// the last read or write.
#[derive(Debug, Clone)]
pub struct CacheEntry<K, V> {
    key: K,
    value: V,
    access_time: Instant,
    write_time: Instant,
    /// Insertion sequence number, used to list keys in insertion order
    seq: u64,
}

impl<K, V> CacheEntry<K, V> {
    // == Constructor ==
    /// Creates a freshly written entry.
    pub fn new(key: K, value: V, seq: u64) -> Self {
        let now = Instant::now();
        Self {
            key,
            value,
            access_time: now,
            write_time: now,
            seq,
        }
    }

    /// Returns the key, refreshing the access time.
    pub fn key(&mut self) -> &K {
        self.access_time = Instant::now();
        &self.key
    }

    /// Returns the value, refreshing the access time.
    pub fn value(&mut self) -> &V {
        self.access_time = Instant::now();
        &self.value
    }

    /// Borrows the value without counting as an access.
    pub fn peek(&self) -> &V {
        &self.value
    }

    /// Replaces the value in place and refreshes both timestamps.
    pub fn set_value(&mut self, value: V) -> V {
        let now = Instant::now();
        self.access_time = now;
        self.write_time = now;
        std::mem::replace(&mut self.value, value)
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn into_parts(self) -> (K, V) {
        (self.key, self.value)
    }

    // == Is Expired ==
    /// Checks the entry against both expiration policies.
    ///
    /// The two policies are independent: an entry expires as soon as it
    /// violates either of them. With neither enabled it never expires.
    pub fn is_expired(&self, options: &CacheOptions) -> bool {
        self.is_expired_at(options, Instant::now())
    }

    pub(crate) fn is_expired_at(&self, options: &CacheOptions, now: Instant) -> bool {
        if !options.expire_after_access.is_zero()
            && now.saturating_duration_since(self.access_time) > options.expire_after_access
        {
            return true;
        }
        if !options.expire_after_write.is_zero()
            && now.saturating_duration_since(self.write_time) > options.expire_after_write
        {
            return true;
        }
        false
    }
}
