//! Loading Cache Module
//!
//! Read-through cache that loads missing values with loaders bound at
//! construction.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::store::dedup;
use crate::cache::{
    BatchResult, CacheEvent, CacheKey, CacheStats, CacheStore, CacheValue, ListenerId, Loader,
    MultiLoader,
};
use crate::config::CacheOptions;
use crate::error::{CacheError, LoadResult, Result};

// == Loading Cache ==
/// A [`CacheStore`] with a default single-key loader and an optional batch
/// loader.
///
/// A mapping function passed to a call takes precedence over the bound
/// loaders for that call only.
///
/// # Example
/// ```
/// use loading_cache::{CacheOptions, LoadingCache};
///
/// let cache = LoadingCache::new(CacheOptions::default(), |key: &String| Ok(Some(key.len())));
/// assert_eq!(cache.get(&"four".to_string()).unwrap(), Some(4));
/// ```
pub struct LoadingCache<K: CacheKey, V: CacheValue> {
    store: CacheStore<K, V>,
    loader: Option<Loader<K, V>>,
    multi_loader: Option<MultiLoader<K, V>>,
}

impl<K: CacheKey, V: CacheValue> LoadingCache<K, V> {
    // == Constructors ==
    /// Creates a cache with a single-key loader.
    pub fn new<F>(options: CacheOptions, loader: F) -> Self
    where
        F: Fn(&K) -> LoadResult<V> + Send + Sync + 'static,
    {
        let loader: Loader<K, V> = Arc::new(loader);
        Self::from_parts(options, Some(loader), None)
    }

    /// Creates a cache with a single-key loader and a batch loader.
    pub fn with_multi_loader<F, M>(options: CacheOptions, loader: F, multi_loader: M) -> Self
    where
        F: Fn(&K) -> LoadResult<V> + Send + Sync + 'static,
        M: Fn(&[K]) -> BatchResult<K, V> + Send + Sync + 'static,
    {
        let loader: Loader<K, V> = Arc::new(loader);
        let multi_loader: MultiLoader<K, V> = Arc::new(multi_loader);
        Self::from_parts(options, Some(loader), Some(multi_loader))
    }

    pub fn from_parts(
        options: CacheOptions,
        loader: Option<Loader<K, V>>,
        multi_loader: Option<MultiLoader<K, V>>,
    ) -> Self {
        Self {
            store: CacheStore::new(options),
            loader,
            multi_loader,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &CacheStore<K, V> {
        &self.store
    }

    pub fn options(&self) -> &CacheOptions {
        self.store.options()
    }

    pub fn stats(&self) -> &CacheStats {
        self.store.stats()
    }

    /// Registers a listener for the events raised by the underlying store.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CacheEvent<K, V>) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.store.unsubscribe(id)
    }

    // == Get ==
    pub fn get_if_present(&self, key: &K) -> Option<V> {
        self.store.get_if_present(key)
    }

    /// Returns the value, loading it with the bound loader on a miss.
    ///
    /// Without a loader this is a plain presence check.
    pub fn get(&self, key: &K) -> Result<Option<V>> {
        match &self.loader {
            Some(loader) => self.store.get_with(key, |k| loader(k)),
            None => Ok(self.store.get_if_present(key)),
        }
    }

    /// Returns the value, loading it with `mapping` on a miss.
    pub fn get_with<F>(&self, key: &K, mapping: F) -> Result<Option<V>>
    where
        F: FnOnce(&K) -> LoadResult<V>,
    {
        self.store.get_with(key, mapping)
    }

    pub fn get_all_present<I>(&self, keys: I) -> HashMap<K, V>
    where
        I: IntoIterator<Item = K>,
    {
        self.store.get_all_present(keys)
    }

    // == Get All ==
    /// Returns present values and loads the missing ones.
    ///
    /// Uses the batch loader when bound, otherwise the single-key loader once
    /// per missing key. Without any loader only present values are returned.
    pub fn get_all<I>(&self, keys: I) -> Result<HashMap<K, V>>
    where
        I: IntoIterator<Item = K>,
    {
        if let Some(multi_loader) = &self.multi_loader {
            return self.store.get_all_with(keys, |missing| multi_loader(missing));
        }

        let keys = dedup(keys);
        let mut found = self.store.get_all_present(keys.iter().cloned());
        if let Some(loader) = &self.loader {
            for key in keys {
                if found.contains_key(&key) {
                    continue;
                }
                if let Some(value) = self.store.refresh_with(&key, |k| loader(k))? {
                    found.insert(key, value);
                }
            }
        }
        Ok(found)
    }

    /// Returns present values and loads the missing ones with `mapping`.
    pub fn get_all_with<I, F>(&self, keys: I, mapping: F) -> Result<HashMap<K, V>>
    where
        I: IntoIterator<Item = K>,
        F: FnOnce(&[K]) -> BatchResult<K, V>,
    {
        self.store.get_all_with(keys, mapping)
    }

    // == Refresh ==
    /// Reloads the value with the bound loader, replacing the current one.
    pub fn refresh(&self, key: &K) -> Result<Option<V>> {
        match &self.loader {
            Some(loader) => self.store.refresh_with(key, |k| loader(k)),
            None => Err(CacheError::NoLoader),
        }
    }

    // == Put ==
    pub fn put(&self, key: K, value: V) {
        self.store.put(key, value);
    }

    pub fn put_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.store.put_all(values);
    }

    // == Invalidate ==
    pub fn invalidate(&self, key: &K) -> bool {
        self.store.invalidate(key)
    }

    pub fn invalidate_keys<'a, I>(&self, keys: I)
    where
        I: IntoIterator<Item = &'a K>,
    {
        self.store.invalidate_keys(keys);
    }

    pub fn invalidate_all(&self) {
        self.store.invalidate_all();
    }

    pub fn keys(&self) -> Vec<K> {
        self.store.keys()
    }

    pub fn has(&self, key: &K) -> bool {
        self.store.has(key)
    }

    /// Stops the background expiration sweep.
    pub fn end(&self) {
        self.store.end();
    }
}
