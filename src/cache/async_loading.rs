//! Async Loading Cache Module
//!
//! Read-through cache whose values are shared load handles. Concurrent
//! requests for the same missing key share a single load.
//!
//! A key moves through three states as seen through the store: absent,
//! pending (a placeholder handle is stored) and resolved. The placeholder is
//! always stored before the loader is invoked, so a competing request finds
//! it instead of starting a second load.

use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tracing::{debug, warn};

use crate::cache::store::{dedup, Slot};
use crate::cache::{
    AsyncLoader, AsyncMultiLoader, BatchResult, CacheEvent, CacheKey, CacheStats, CacheStore,
    CacheValue, Completer, ListenerId, LoadHandle, StatKind, StoreInner,
};
use crate::config::CacheOptions;
use crate::error::{CacheError, LoadResult, Result};

// == Async Loading Cache ==
/// A cache of [`LoadHandle`]s with request coalescing.
///
/// Loads are spawned on the current tokio runtime as soon as they start, so
/// they run to completion even if nobody awaits the returned handle. All
/// loading operations must therefore be called from within a runtime.
///
/// # Example
/// ```
/// use loading_cache::{AsyncLoadingCache, CacheOptions};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let cache = AsyncLoadingCache::new(CacheOptions::default(), |key: &String| {
///     let key = key.clone();
///     async move { Ok(Some(key.to_uppercase())) }
/// });
/// let value = cache.get(&"abc".to_string()).await.unwrap();
/// assert_eq!(value, Some("ABC".to_string()));
/// # cache.end();
/// # }
/// ```
pub struct AsyncLoadingCache<K: CacheKey, V: CacheValue> {
    store: CacheStore<K, LoadHandle<V>>,
    loader: Option<AsyncLoader<K, V>>,
    multi_loader: Option<AsyncMultiLoader<K, V>>,
}

impl<K: CacheKey, V: CacheValue> AsyncLoadingCache<K, V> {
    // == Constructors ==
    /// Creates a cache with a single-key loader.
    pub fn new<F, Fut>(options: CacheOptions, loader: F) -> Self
    where
        F: Fn(&K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        Self::from_parts(options, Some(boxed_loader(loader)), None)
    }

    /// Creates a cache with a single-key loader and a batch loader.
    pub fn with_multi_loader<F, Fut, M, MFut>(options: CacheOptions, loader: F, multi_loader: M) -> Self
    where
        F: Fn(&K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
        M: Fn(&[K]) -> MFut + Send + Sync + 'static,
        MFut: Future<Output = BatchResult<K, V>> + Send + 'static,
    {
        Self::from_parts(
            options,
            Some(boxed_loader(loader)),
            Some(boxed_multi_loader(multi_loader)),
        )
    }

    pub fn from_parts(
        options: CacheOptions,
        loader: Option<AsyncLoader<K, V>>,
        multi_loader: Option<AsyncMultiLoader<K, V>>,
    ) -> Self {
        Self {
            store: CacheStore::new(options),
            loader,
            multi_loader,
        }
    }

    /// The underlying store of handles.
    pub fn store(&self) -> &CacheStore<K, LoadHandle<V>> {
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
        F: Fn(&CacheEvent<K, LoadHandle<V>>) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.store.unsubscribe(id)
    }

    // == Get ==
    /// Returns the stored handle, pending or resolved, if there is one.
    pub fn get_if_present(&self, key: &K) -> Option<LoadHandle<V>> {
        self.store.get_if_present(key)
    }

    /// Returns the handle for `key`, starting a load with the bound loader on
    /// a miss.
    ///
    /// Without a loader a miss yields a handle resolved to `None`.
    pub fn get(&self, key: &K) -> LoadHandle<V> {
        match &self.loader {
            Some(loader) => {
                let loader = loader.clone();
                self.load(key, false, move |k| loader(k))
            }
            None => self
                .store
                .get_if_present(key)
                .unwrap_or_else(|| LoadHandle::ready(None)),
        }
    }

    /// Returns the handle for `key`, starting a load with `mapping` on a miss.
    pub fn get_with<F, Fut>(&self, key: &K, mapping: F) -> LoadHandle<V>
    where
        F: FnOnce(&K) -> Fut,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        self.load(key, false, |k| mapping(k).boxed())
    }

    // == Refresh ==
    /// Starts a fresh load with the bound loader, replacing whatever handle
    /// occupies the key.
    ///
    /// Holders of the previous handle keep observing its result.
    pub fn refresh(&self, key: &K) -> LoadHandle<V> {
        match &self.loader {
            Some(loader) => {
                let loader = loader.clone();
                self.load(key, true, move |k| loader(k))
            }
            None => LoadHandle::failed(CacheError::NoLoader),
        }
    }

    /// Publishes a placeholder for `key`, then starts the load that settles it.
    fn load<F>(&self, key: &K, force: bool, start: F) -> LoadHandle<V>
    where
        F: FnOnce(&K) -> BoxFuture<'static, LoadResult<V>>,
    {
        let mut completer = None;
        let handle = if force {
            let (handle, pending) = LoadHandle::pending();
            self.store.put(key.clone(), handle.clone());
            completer = Some(pending);
            handle
        } else {
            let slot = self.store.inner().get_or_insert_with(key, || {
                let (handle, pending) = LoadHandle::pending();
                completer = Some(pending);
                handle
            });
            match slot {
                Slot::Present(existing) => return existing,
                Slot::Reserved(handle) => handle,
            }
        };
        let Some(completer) = completer else {
            return handle;
        };

        // The placeholder is visible to other callers from here on.
        let store = self.store.inner().clone();
        let load = match panic::catch_unwind(AssertUnwindSafe(|| start(key))) {
            Ok(load) => load,
            Err(payload) => {
                store.remove_if(key, |stored| stored.same_load(&handle));
                store.record(StatKind::LoadFailure, 1);
                completer.complete(Err(CacheError::Abandoned));
                panic::resume_unwind(payload);
            }
        };

        let key = key.clone();
        let load_id = handle.id();
        tokio::spawn(async move {
            let result = load.await.map_err(CacheError::from);
            settle(&store, &key, load_id, completer, result);
        });
        handle
    }

    // == Get All ==
    /// Returns the present values among `keys`, once their handles resolve.
    ///
    /// Keys whose handle resolves to `None` are omitted.
    pub fn get_all_present<I>(&self, keys: I) -> BoxFuture<'static, Result<HashMap<K, V>>>
    where
        I: IntoIterator<Item = K>,
    {
        let handles = dedup(keys)
            .into_iter()
            .filter_map(|key| self.store.get_if_present(&key).map(|handle| (key, handle)))
            .collect();
        collect_handles(handles)
    }

    /// Returns present values and loads the missing ones.
    ///
    /// With a batch loader, all missing keys are loaded by one call. Otherwise
    /// each missing key goes through [`AsyncLoadingCache::get`]. Without any
    /// loader only present values are returned.
    pub fn get_all<I>(&self, keys: I) -> BoxFuture<'static, Result<HashMap<K, V>>>
    where
        I: IntoIterator<Item = K>,
    {
        if let Some(multi_loader) = &self.multi_loader {
            let multi_loader = multi_loader.clone();
            return self.load_all(keys, move |missing| multi_loader(missing));
        }
        if self.loader.is_none() {
            return self.get_all_present(keys);
        }
        let handles = dedup(keys)
            .into_iter()
            .map(|key| {
                let handle = self.get(&key);
                (key, handle)
            })
            .collect();
        collect_handles(handles)
    }

    /// Returns present values and loads the missing ones with one call to
    /// `mapping`.
    pub fn get_all_with<I, F, Fut>(&self, keys: I, mapping: F) -> BoxFuture<'static, Result<HashMap<K, V>>>
    where
        I: IntoIterator<Item = K>,
        F: FnOnce(&[K]) -> Fut,
        Fut: Future<Output = BatchResult<K, V>> + Send + 'static,
    {
        self.load_all(keys, |missing| mapping(missing).boxed())
    }

    /// Reserves a placeholder for every missing key, then starts one batch
    /// load that settles them all.
    fn load_all<I, F>(&self, keys: I, start: F) -> BoxFuture<'static, Result<HashMap<K, V>>>
    where
        I: IntoIterator<Item = K>,
        F: FnOnce(&[K]) -> BoxFuture<'static, BatchResult<K, V>>,
    {
        let keys = dedup(keys);
        let mut handles = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        let mut pending = HashMap::new();

        for key in keys {
            let mut completer = None;
            let slot = self.store.inner().get_or_insert_with(&key, || {
                let (handle, reserved) = LoadHandle::pending();
                completer = Some(reserved);
                handle
            });
            let handle = slot.into_value();
            if let Some(completer) = completer {
                missing.push(key.clone());
                pending.insert(key.clone(), (handle.id(), completer));
            }
            handles.push((key, handle));
        }

        if !missing.is_empty() {
            // Every placeholder is visible before the batch load starts.
            let store = self.store.inner().clone();
            let load = match panic::catch_unwind(AssertUnwindSafe(|| start(&missing))) {
                Ok(load) => load,
                Err(payload) => {
                    settle_batch(&store, pending, Err(CacheError::Abandoned));
                    panic::resume_unwind(payload);
                }
            };
            tokio::spawn(async move {
                let result = load.await.map_err(CacheError::from);
                settle_batch(&store, pending, result);
            });
        }

        collect_handles(handles)
    }

    // == Put ==
    /// Stores an already resolved value.
    pub fn put(&self, key: K, value: V) {
        self.store.put(key, LoadHandle::ready(Some(value)));
    }

    /// Stores an existing handle, pending or not.
    pub fn put_handle(&self, key: K, handle: LoadHandle<V>) {
        self.store.put(key, handle);
    }

    pub fn put_all<I>(&self, values: I)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        self.store.put_all(
            values
                .into_iter()
                .map(|(key, value)| (key, LoadHandle::ready(Some(value)))),
        );
    }

    // == Invalidate ==
    /// Removes the key. A load still running for it completes, but its result
    /// is no longer reachable through the cache.
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

/// Records the outcome of a single load and settles its handle.
///
/// A failed load evicts its own placeholder so a later request can retry; a
/// newer handle stored for the key in the meantime is left in place.
fn settle<K: CacheKey, V: CacheValue>(
    store: &StoreInner<K, LoadHandle<V>>,
    key: &K,
    load_id: u64,
    completer: Completer<V>,
    result: Result<Option<V>>,
) {
    match &result {
        Ok(Some(_)) => store.record(StatKind::LoadSuccess, 1),
        Ok(None) => {
            debug!("Loader returned nothing, evicting placeholder");
            store.remove_if(key, |stored| stored.id() == load_id);
            store.record(StatKind::LoadFailure, 1);
        }
        Err(err) => {
            warn!("Load failed: {}", err);
            store.remove_if(key, |stored| stored.id() == load_id);
            store.record(StatKind::LoadFailure, 1);
        }
    }
    completer.complete(result);
}

/// Settles every placeholder of a batch load.
///
/// Keys missing from the batch result settle to `None`; a failed batch
/// settles every placeholder with the same error.
fn settle_batch<K: CacheKey, V: CacheValue>(
    store: &StoreInner<K, LoadHandle<V>>,
    pending: HashMap<K, (u64, Completer<V>)>,
    result: Result<HashMap<K, V>>,
) {
    let requested = pending.len() as u64;
    match result {
        Ok(mut values) => {
            let mut successes = 0u64;
            for (key, (load_id, completer)) in pending {
                match values.remove(&key) {
                    Some(value) => {
                        successes += 1;
                        completer.complete(Ok(Some(value)));
                    }
                    None => {
                        store.remove_if(&key, |stored| stored.id() == load_id);
                        completer.complete(Ok(None));
                    }
                }
            }
            if !values.is_empty() {
                debug!("Batch load returned {} unrequested keys, ignoring them", values.len());
            }
            store.record(StatKind::LoadSuccess, successes);
            store.record(StatKind::LoadFailure, requested - successes);
        }
        Err(err) => {
            warn!("Batch load of {} keys failed: {}", requested, err);
            for (key, (load_id, completer)) in pending {
                store.remove_if(&key, |stored| stored.id() == load_id);
                completer.complete(Err(err.clone()));
            }
            store.record(StatKind::LoadFailure, requested);
        }
    }
}

/// Waits for every handle and keeps the keys that resolved to a value.
fn collect_handles<K: CacheKey, V: CacheValue>(
    handles: Vec<(K, LoadHandle<V>)>,
) -> BoxFuture<'static, Result<HashMap<K, V>>> {
    async move {
        let mut values = HashMap::with_capacity(handles.len());
        for (key, handle) in handles {
            if let Some(value) = handle.await? {
                values.insert(key, value);
            }
        }
        Ok::<_, CacheError>(values)
    }
    .boxed()
}

fn boxed_loader<K, V, F, Fut>(loader: F) -> AsyncLoader<K, V>
where
    F: Fn(&K) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = LoadResult<V>> + Send + 'static,
{
    Arc::new(move |key: &K| loader(key).boxed())
}

fn boxed_multi_loader<K, V, M, MFut>(multi_loader: M) -> AsyncMultiLoader<K, V>
where
    M: Fn(&[K]) -> MFut + Send + Sync + 'static,
    MFut: Future<Output = BatchResult<K, V>> + Send + 'static,
{
    Arc::new(move |keys: &[K]| multi_loader(keys).boxed())
}
