//! Cache Store Module
//!
//! Main cache engine: the entry map with expiration-aware reads, optional
//! on-demand loading for single and batch misses, and the sweep that evicts
//! expired entries.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheEntry, CacheEvent, CacheKey, CacheStats, CacheValue, EventHub, ListenerId, StatKind};
use crate::config::CacheOptions;
use crate::error::{BoxError, CacheError, LoadResult, Result};
use crate::tasks::{spawn_sweep_task, SweepTask};

/// Outcome of a lookup made while the entry lock is held.
enum Probe<K, V> {
    Hit(V),
    Miss,
    /// Present but expired; carries the entry if it was removed
    Expired(Option<(K, V)>),
}

/// Result of [`StoreInner::get_or_insert_with`].
pub(crate) enum Slot<V> {
    /// A live value was already stored
    Present(V),
    /// The key was missing and the new value now occupies it
    Reserved(V),
}

impl<V> Slot<V> {
    pub(crate) fn into_value(self) -> V {
        match self {
            Slot::Present(value) | Slot::Reserved(value) => value,
        }
    }
}

#[derive(Debug)]
struct Entries<K, V> {
    map: HashMap<K, CacheEntry<K, V>>,
    next_seq: u64,
}

// == Store Internals ==
/// State shared between a store, its sweep task and in-flight loads.
#[derive(Debug)]
pub(crate) struct StoreInner<K, V> {
    entries: Mutex<Entries<K, V>>,
    options: CacheOptions,
    stats: CacheStats,
    events: EventHub<K, V>,
}

impl<K: CacheKey, V: CacheValue> StoreInner<K, V> {
    fn new(options: CacheOptions) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_seq: 0,
            }),
            options,
            stats: CacheStats::new(),
            events: EventHub::new(),
        }
    }

    // == Record ==
    /// Increments a counter and raises the matching stat event.
    pub(crate) fn record(&self, kind: StatKind, delta: u64) {
        if !self.options.record_stats || delta == 0 {
            return;
        }
        let previous = self.stats.inc(kind, delta);
        self.events.emit(&CacheEvent::Stat {
            kind,
            delta,
            previous,
        });
    }

    fn probe(&self, entries: &mut Entries<K, V>, key: &K) -> Probe<K, V> {
        let expired = match entries.map.get(key) {
            None => return Probe::Miss,
            Some(entry) => entry.is_expired(&self.options),
        };
        if expired {
            if !self.options.delete_on_expiration {
                return Probe::Expired(None);
            }
            return Probe::Expired(entries.map.remove(key).map(CacheEntry::into_parts));
        }
        match entries.map.get_mut(key) {
            Some(entry) => Probe::Hit(entry.value().clone()),
            None => Probe::Miss,
        }
    }

    /// Records stats and events for a probe once the lock is released.
    fn settle_probe(&self, probe: Probe<K, V>) -> Option<V> {
        match probe {
            Probe::Hit(value) => {
                self.record(StatKind::Hit, 1);
                Some(value)
            }
            Probe::Miss => {
                self.record(StatKind::Miss, 1);
                None
            }
            Probe::Expired(removed) => {
                if let Some((key, value)) = removed {
                    self.events.emit(&CacheEvent::Expire { key, value });
                    self.record(StatKind::Expire, 1);
                }
                self.record(StatKind::Miss, 1);
                None
            }
        }
    }

    // == Get If Present ==
    /// Returns the value if it is stored and not expired.
    pub(crate) fn get_if_present(&self, key: &K) -> Option<V> {
        let probe = {
            let mut entries = self.entries.lock();
            self.probe(&mut entries, key)
        };
        self.settle_probe(probe)
    }

    /// Returns the live value for `key`, or stores the one built by `make`.
    ///
    /// Lookup and insertion happen under one lock, so of several concurrent
    /// callers exactly one observes [`Slot::Reserved`].
    pub(crate) fn get_or_insert_with(&self, key: &K, make: impl FnOnce() -> V) -> Slot<V> {
        let (probe, slot) = {
            let mut entries = self.entries.lock();
            let probe = self.probe(&mut entries, key);
            match probe {
                Probe::Hit(value) => (Probe::Hit(value.clone()), Slot::Present(value)),
                other => {
                    let value = make();
                    Self::upsert(&mut entries, key.clone(), value.clone());
                    (other, Slot::Reserved(value))
                }
            }
        };
        self.settle_probe(probe);
        slot
    }

    // == Load ==
    /// Returns the live value, or runs `mapping` and stores what it yields.
    ///
    /// With `force` the presence check is skipped and the value is always
    /// reloaded.
    pub(crate) fn load<F>(&self, key: &K, mapping: F, force: bool) -> Result<Option<V>>
    where
        F: FnOnce(&K) -> LoadResult<V>,
    {
        if !force {
            if let Some(value) = self.get_if_present(key) {
                return Ok(Some(value));
            }
        }
        match mapping(key) {
            Ok(Some(value)) => {
                self.put(key.clone(), value.clone());
                self.record(StatKind::LoadSuccess, 1);
                Ok(Some(value))
            }
            Ok(None) => {
                self.record(StatKind::LoadFailure, 1);
                Ok(None)
            }
            Err(err) => {
                self.record(StatKind::LoadFailure, 1);
                Err(CacheError::from(err))
            }
        }
    }

    pub(crate) fn get_all_present(&self, keys: &[K]) -> HashMap<K, V> {
        keys.iter()
            .filter_map(|key| self.get_if_present(key).map(|value| (key.clone(), value)))
            .collect()
    }

    // == Get All ==
    /// Returns every requested key that is present or could be loaded.
    ///
    /// `mapping` is called once, with exactly the missing keys, and only if
    /// some are missing. Keys it returns that were not asked for are ignored.
    pub(crate) fn load_all<F>(&self, keys: &[K], mapping: F) -> Result<HashMap<K, V>>
    where
        F: FnOnce(&[K]) -> std::result::Result<HashMap<K, V>, BoxError>,
    {
        let mut found = self.get_all_present(keys);
        let missing: Vec<K> = keys
            .iter()
            .filter(|key| !found.contains_key(*key))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(found);
        }

        let mut loaded = match mapping(&missing) {
            Ok(loaded) => loaded,
            Err(err) => {
                self.record(StatKind::LoadFailure, missing.len() as u64);
                return Err(CacheError::from(err));
            }
        };

        let mut successes = 0u64;
        for key in &missing {
            if let Some(value) = loaded.remove(key) {
                self.put(key.clone(), value.clone());
                found.insert(key.clone(), value);
                successes += 1;
            }
        }
        if !loaded.is_empty() {
            debug!("Batch load returned {} unrequested keys, ignoring them", loaded.len());
        }

        self.record(StatKind::LoadSuccess, successes);
        self.record(StatKind::LoadFailure, missing.len() as u64 - successes);
        Ok(found)
    }

    fn upsert(entries: &mut Entries<K, V>, key: K, value: V) {
        if let Some(entry) = entries.map.get_mut(&key) {
            entry.set_value(value);
            return;
        }
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries.map.insert(key.clone(), CacheEntry::new(key, value, seq));
    }

    // == Put ==
    /// Stores a value, reusing the existing slot for the key if there is one.
    pub(crate) fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock();
        Self::upsert(&mut entries, key, value);
    }

    /// Removes the entry for `key` if its value satisfies `predicate`.
    pub(crate) fn remove_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> bool {
        let mut entries = self.entries.lock();
        let matches = entries
            .map
            .get(key)
            .map(|entry| predicate(entry.peek()))
            .unwrap_or(false);
        if matches {
            entries.map.remove(key);
        }
        matches
    }

    pub(crate) fn invalidate(&self, key: &K) -> bool {
        self.entries.lock().map.remove(key).is_some()
    }

    pub(crate) fn invalidate_all(&self) {
        self.entries.lock().map.clear();
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        let entries = self.entries.lock();
        let mut keyed: Vec<(u64, K)> = entries
            .map
            .iter()
            .map(|(key, entry)| (entry.seq(), key.clone()))
            .collect();
        keyed.sort_unstable_by_key(|(seq, _)| *seq);
        keyed.into_iter().map(|(_, key)| key).collect()
    }

    pub(crate) fn has(&self, key: &K) -> bool {
        self.entries.lock().map.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    // == Sweep Expired ==
    /// Removes all expired entries, raising an expire event for each.
    ///
    /// Does nothing when expired entries are configured to stay in place.
    /// Returns the number of entries removed.
    pub(crate) fn sweep_expired(&self) -> usize {
        if !self.options.delete_on_expiration || !self.options.expires() {
            return 0;
        }

        let expired: Vec<(K, V)> = {
            let mut entries = self.entries.lock();
            let expired_keys: Vec<K> = entries
                .map
                .iter()
                .filter(|(_, entry)| entry.is_expired(&self.options))
                .map(|(key, _)| key.clone())
                .collect();
            expired_keys
                .into_iter()
                .filter_map(|key| entries.map.remove(&key))
                .map(CacheEntry::into_parts)
                .collect()
        };

        let count = expired.len();
        for (key, value) in expired {
            self.events.emit(&CacheEvent::Expire { key, value });
        }
        self.record(StatKind::Expire, count as u64);
        count
    }
}

// == Cache Store ==
/// Cache with expiration and on-demand loading through per-call mapping
/// functions.
///
/// When `delete_on_expiration` is set, an expiration sweep runs once on
/// construction and then every `expiration_interval`, on the current tokio
/// runtime if there is one and on a dedicated thread otherwise. The sweep
/// belongs to the store: [`CacheStore::end`] (or dropping the store) stops it.
///
/// # Example
/// ```
/// use loading_cache::{CacheOptions, CacheStore};
///
/// let store: CacheStore<String, u32> = CacheStore::new(CacheOptions::default());
/// store.put("answer".to_string(), 42);
/// assert_eq!(store.get_if_present(&"answer".to_string()), Some(42));
/// ```
#[derive(Debug)]
pub struct CacheStore<K: CacheKey, V: CacheValue> {
    inner: Arc<StoreInner<K, V>>,
    sweeper: Mutex<Option<SweepTask>>,
}

impl<K: CacheKey, V: CacheValue> CacheStore<K, V> {
    // == Constructor ==
    /// Creates a store and starts expiration sweeping if configured.
    pub fn new(options: CacheOptions) -> Self {
        let inner = Arc::new(StoreInner::new(options));
        let mut sweeper = None;
        if inner.options.delete_on_expiration {
            inner.sweep_expired();
            // Options are fixed, so without a policy nothing can ever expire
            if inner.options.expires() && !inner.options.expiration_interval.is_zero() {
                sweeper = spawn_sweep_task(Arc::downgrade(&inner), inner.options.expiration_interval);
            }
        }
        Self {
            inner,
            sweeper: Mutex::new(sweeper),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<StoreInner<K, V>> {
        &self.inner
    }

    pub fn options(&self) -> &CacheOptions {
        &self.inner.options
    }

    pub fn stats(&self) -> &CacheStats {
        &self.inner.stats
    }

    // == Events ==
    /// Registers a listener for expire, stat and error events.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CacheEvent<K, V>) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    // == Get ==
    /// Returns the value if present and not expired.
    ///
    /// Records a hit or a miss. An expired entry counts as a miss and, with
    /// `delete_on_expiration`, is removed and reported as expired.
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.inner.get_if_present(key)
    }

    /// Returns the value if present, otherwise loads it with `mapping`.
    ///
    /// A loaded `Some` is stored and counted as a load success. `None` is
    /// counted as a load failure and nothing is stored. Loader errors are
    /// counted as failures and returned to the caller.
    pub fn get_with<F>(&self, key: &K, mapping: F) -> Result<Option<V>>
    where
        F: FnOnce(&K) -> LoadResult<V>,
    {
        self.inner.load(key, mapping, false)
    }

    /// Reloads the value with `mapping`, skipping the presence check.
    pub fn refresh_with<F>(&self, key: &K, mapping: F) -> Result<Option<V>>
    where
        F: FnOnce(&K) -> LoadResult<V>,
    {
        self.inner.load(key, mapping, true)
    }

    /// Returns the present, non-expired values among `keys`.
    pub fn get_all_present<I>(&self, keys: I) -> HashMap<K, V>
    where
        I: IntoIterator<Item = K>,
    {
        self.inner.get_all_present(&dedup(keys))
    }

    /// Returns present values and loads the missing ones in a single batch.
    pub fn get_all_with<I, F>(&self, keys: I, mapping: F) -> Result<HashMap<K, V>>
    where
        I: IntoIterator<Item = K>,
        F: FnOnce(&[K]) -> std::result::Result<HashMap<K, V>, BoxError>,
    {
        self.inner.load_all(&dedup(keys), mapping)
    }

    // == Put ==
    /// Stores a value, replacing any previous one for the key.
    pub fn put(&self, key: K, value: V) {
        self.inner.put(key, value);
    }

    pub fn put_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        for (key, value) in values {
            self.inner.put(key, value);
        }
    }

    // == Invalidate ==
    /// Removes the key. Returns false if it was not stored.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.invalidate(key)
    }

    pub fn invalidate_keys<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a K>,
    {
        for key in keys {
            self.inner.invalidate(key);
        }
    }

    /// Removes every entry.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }

    /// Lists stored keys in insertion order, including expired entries that
    /// have not been swept yet.
    pub fn keys(&self) -> Vec<K> {
        self.inner.keys()
    }

    /// Returns true if an entry is stored for the key, expired or not.
    pub fn has(&self, key: &K) -> bool {
        self.inner.has(key)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs an expiration sweep now. Returns the number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        self.inner.sweep_expired()
    }

    // == End ==
    /// Stops the background sweep. Safe to call more than once.
    pub fn end(&self) {
        if let Some(task) = self.sweeper.lock().take() {
            task.stop();
            debug!("Expiration sweep task stopped");
        }
    }
}

impl<K: CacheKey, V: CacheValue> Drop for CacheStore<K, V> {
    fn drop(&mut self) {
        self.end();
    }
}

/// Drops repeated keys, keeping the first occurrence.
pub(crate) fn dedup<K: CacheKey, I: IntoIterator<Item = K>>(keys: I) -> Vec<K> {
    let mut seen = HashSet::new();
    keys.into_iter().filter(|key| seen.insert(key.clone())).collect()
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn lazy_options(write_ms: u64) -> CacheOptions {
        CacheOptions {
            expire_after_write: Duration::from_millis(write_ms),
            expiration_interval: Duration::ZERO,
            ..CacheOptions::default()
        }
    }

    fn store() -> CacheStore<String, String> {
        CacheStore::new(CacheOptions::default())
    }

    fn events(store: &CacheStore<String, String>) -> Arc<Mutex<Vec<CacheEvent<String, String>>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        store.subscribe(move |event| sink.lock().push(event.clone()));
        seen
    }

    #[test]
    fn test_store_new() {
        let store = store();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
    }

    #[test]
    fn test_miss_on_unknown_key() {
        let store = store();

        assert_eq!(store.get_if_present(&"nope".to_string()), None);
        assert_eq!(store.stats().get(StatKind::Miss), 1);
        assert_eq!(store.stats().get(StatKind::Hit), 0);
    }

    #[test]
    fn test_put_and_get_if_present() {
        let store = store();

        store.put("key1".to_string(), "value1".to_string());
        assert_eq!(store.get_if_present(&"key1".to_string()), Some("value1".to_string()));
        assert_eq!(store.stats().get(StatKind::Hit), 1);
    }

    #[test]
    fn test_overwrite_reuses_slot() {
        let store = store();

        store.put("a".to_string(), "1".to_string());
        store.put("b".to_string(), "2".to_string());
        store.put("a".to_string(), "3".to_string());

        assert_eq!(store.len(), 2);
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.get_if_present(&"a".to_string()), Some("3".to_string()));
    }

    #[test]
    fn test_get_with_loads_once() {
        let store = store();
        let mut calls = 0;

        let first = store
            .get_with(&"a".to_string(), |k| {
                calls += 1;
                Ok(Some(format!("{k}X")))
            })
            .unwrap();
        let second = store
            .get_with(&"a".to_string(), |_| panic!("must not load a present key"))
            .unwrap();

        assert_eq!(first, Some("aX".to_string()));
        assert_eq!(second, Some("aX".to_string()));
        assert_eq!(calls, 1);
        assert_eq!(store.stats().get(StatKind::LoadSuccess), 1);
        assert_eq!(store.stats().get(StatKind::Hit), 1);
        assert_eq!(store.stats().get(StatKind::Miss), 1);
    }

    #[test]
    fn test_get_with_none_is_not_stored() {
        let store = store();

        let loaded = store.get_with(&"a".to_string(), |_| Ok(None)).unwrap();

        assert_eq!(loaded, None);
        assert!(!store.has(&"a".to_string()));
        assert_eq!(store.stats().get(StatKind::LoadFailure), 1);
    }

    #[test]
    fn test_get_with_propagates_loader_error() {
        let store = store();

        let result = store.get_with(&"a".to_string(), |_| Err("backend down".into()));

        assert!(matches!(result, Err(CacheError::Loader(_))));
        assert!(!store.has(&"a".to_string()));
        assert_eq!(store.stats().get(StatKind::LoadFailure), 1);
    }

    #[test]
    fn test_refresh_with_overwrites_present_value() {
        let store = store();
        store.put("a".to_string(), "old".to_string());

        let refreshed = store
            .refresh_with(&"a".to_string(), |_| Ok(Some("new".to_string())))
            .unwrap();

        assert_eq!(refreshed, Some("new".to_string()));
        assert_eq!(store.get_if_present(&"a".to_string()), Some("new".to_string()));
        // refresh does not look the key up first
        assert_eq!(store.stats().get(StatKind::Hit), 1);
        assert_eq!(store.stats().get(StatKind::Miss), 0);
    }

    #[test]
    fn test_get_all_present_omits_missing() {
        let store = store();
        store.put("a".to_string(), "1".to_string());
        store.put("c".to_string(), "3".to_string());

        let found = store.get_all_present(["a", "b", "c"].map(String::from));

        assert_eq!(found.len(), 2);
        assert_eq!(found["a"], "1");
        assert_eq!(found["c"], "3");
        assert_eq!(store.stats().get(StatKind::Hit), 2);
        assert_eq!(store.stats().get(StatKind::Miss), 1);
    }

    #[test]
    fn test_get_all_with_loads_only_missing_keys() {
        let store = store();
        store.put("a".to_string(), "1".to_string());
        let mut requested = Vec::new();

        let found = store
            .get_all_with(["a", "b", "c", "d"].map(String::from), |missing| {
                requested = missing.to_vec();
                Ok(missing
                    .iter()
                    .filter(|k| k.as_str() != "d")
                    .map(|k| (k.clone(), format!("{k}!")))
                    .chain([("zzz".to_string(), "extra".to_string())])
                    .collect())
            })
            .unwrap();

        assert_eq!(requested, ["b", "c", "d"].map(String::from).to_vec());
        assert_eq!(found.len(), 3);
        assert_eq!(found["b"], "b!");
        assert!(!found.contains_key("d"));
        assert!(!store.has(&"zzz".to_string()));
        assert_eq!(store.stats().get(StatKind::LoadSuccess), 2);
        assert_eq!(store.stats().get(StatKind::LoadFailure), 1);
    }

    #[test]
    fn test_get_all_with_skips_mapping_when_all_present() {
        let store = store();
        store.put("a".to_string(), "1".to_string());

        let found = store
            .get_all_with(vec!["a".to_string()], |_| panic!("nothing is missing"))
            .unwrap();

        assert_eq!(found.len(), 1);
    }

    #[test]
    fn test_get_all_with_batch_error() {
        let store = store();

        let result = store.get_all_with(["a", "b"].map(String::from), |_| Err("nope".into()));

        assert!(result.is_err());
        assert_eq!(store.stats().get(StatKind::LoadFailure), 2);
    }

    #[test]
    fn test_invalidate_absent_is_noop() {
        let store = store();

        assert!(!store.invalidate(&"missing".to_string()));

        store.put("a".to_string(), "1".to_string());
        assert!(store.invalidate(&"a".to_string()));
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalidate_keys_and_all() {
        let store = store();
        store.put_all(["a", "b", "c"].map(|k| (k.to_string(), k.to_uppercase())));

        store.invalidate_keys(&["a".to_string(), "zzz".to_string()]);
        assert_eq!(store.keys(), vec!["b".to_string(), "c".to_string()]);

        store.invalidate_all();
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lazy_expiry_removes_and_notifies() {
        let store = CacheStore::new(lazy_options(1000));
        let seen = events(&store);
        store.put("a".to_string(), "1".to_string());

        tokio::time::advance(Duration::from_millis(1500)).await;

        assert!(store.has(&"a".to_string()));
        assert_eq!(store.get_if_present(&"a".to_string()), None);
        assert!(!store.has(&"a".to_string()));
        assert_eq!(store.stats().get(StatKind::Expire), 1);
        assert_eq!(store.stats().get(StatKind::Miss), 1);
        assert!(seen.lock().contains(&CacheEvent::Expire {
            key: "a".to_string(),
            value: "1".to_string()
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entries_hidden_when_not_deleted() {
        let store = CacheStore::new(CacheOptions {
            delete_on_expiration: false,
            ..lazy_options(1000)
        });
        let seen = events(&store);
        store.put("a".to_string(), "1".to_string());

        tokio::time::advance(Duration::from_millis(1500)).await;

        assert_eq!(store.get_if_present(&"a".to_string()), None);
        assert!(store.has(&"a".to_string()));
        assert_eq!(store.cleanup_expired(), 0);
        assert_eq!(store.stats().get(StatKind::Expire), 0);
        assert!(!seen.lock().iter().any(|e| e.kind() == crate::cache::EventKind::Expire));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired() {
        let store = CacheStore::new(CacheOptions {
            expire_after_access: Duration::from_millis(1000),
            expiration_interval: Duration::ZERO,
            ..CacheOptions::default()
        });
        store.put("stale".to_string(), "1".to_string());
        store.put("fresh".to_string(), "2".to_string());

        tokio::time::advance(Duration::from_millis(800)).await;
        store.get_if_present(&"fresh".to_string());
        tokio::time::advance(Duration::from_millis(800)).await;

        assert_eq!(store.cleanup_expired(), 1);
        assert_eq!(store.keys(), vec!["fresh".to_string()]);
        assert_eq!(store.stats().get(StatKind::Expire), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_survives_panicking_expire_listener() {
        let store: CacheStore<String, String> = CacheStore::new(lazy_options(1000));
        store.subscribe(|event| {
            if let CacheEvent::Expire { .. } = event {
                panic!("expire listener failed");
            }
        });
        let seen = events(&store);
        store.put_all(["a", "b", "c"].map(|k| (k.to_string(), k.to_uppercase())));

        tokio::time::advance(Duration::from_millis(1500)).await;

        assert_eq!(store.cleanup_expired(), 3);
        assert!(store.is_empty());
        assert_eq!(store.stats().get(StatKind::Expire), 3);
        let seen = seen.lock();
        let expired = seen.iter().filter(|e| e.kind() == crate::cache::EventKind::Expire).count();
        let errors = seen.iter().filter(|e| e.kind() == crate::cache::EventKind::Error).count();
        assert_eq!(expired, 3);
        assert_eq!(errors, 3);
    }

    #[test]
    fn test_reset_stats_keeps_entries() {
        let store = store();
        store.put("a".to_string(), "1".to_string());
        store.put("b".to_string(), "2".to_string());
        store.get_if_present(&"a".to_string());
        store.get_if_present(&"zzz".to_string());

        store.stats().reset();

        assert_eq!(store.stats().snapshot(), crate::cache::StatsSnapshot::default());
        assert_eq!(store.keys(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(store.get_if_present(&"b".to_string()), Some("2".to_string()));
        assert_eq!(store.stats().get(StatKind::Hit), 1);
    }

    #[test]
    fn test_stat_events_carry_previous_value() {
        let store = store();
        let seen = events(&store);

        store.get_if_present(&"a".to_string());
        store.get_if_present(&"b".to_string());

        let seen = seen.lock();
        assert_eq!(
            seen.as_slice(),
            &[
                CacheEvent::Stat { kind: StatKind::Miss, delta: 1, previous: 0 },
                CacheEvent::Stat { kind: StatKind::Miss, delta: 1, previous: 1 },
            ]
        );
    }

    #[test]
    fn test_record_stats_disabled() {
        let store: CacheStore<String, String> = CacheStore::new(CacheOptions {
            record_stats: false,
            ..CacheOptions::default()
        });

        store.get_if_present(&"a".to_string());
        store.put("a".to_string(), "1".to_string());
        store.get_if_present(&"a".to_string());

        assert_eq!(store.stats().snapshot(), crate::cache::StatsSnapshot::default());
    }

    #[test]
    fn test_listener_may_call_back_into_store() {
        let store = Arc::new(store());
        let weak = Arc::downgrade(&store);
        store.subscribe(move |event| {
            if let (CacheEvent::Stat { kind: StatKind::Miss, .. }, Some(store)) = (event, weak.upgrade()) {
                store.put("seen-miss".to_string(), "yes".to_string());
            }
        });

        store.get_if_present(&"a".to_string());

        assert!(store.has(&"seen-miss".to_string()));
    }

    #[test]
    fn test_end_is_idempotent_without_runtime() {
        let store = store();
        store.end();
        store.end();
    }
}
