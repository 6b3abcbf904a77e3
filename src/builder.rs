//! Cache Builder Module
//!
//! Fluent construction of every cache flavour from one set of options.

use std::future::Future;
use std::time::Duration;

use crate::cache::{AsyncLoadingCache, BatchResult, CacheKey, CacheStore, CacheValue, LoadingCache};
use crate::config::CacheOptions;
use crate::error::LoadResult;

/// Builder for configuring a cache.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use loading_cache::CacheBuilder;
///
/// let cache = CacheBuilder::new()
///     .expire_after_write(Duration::from_secs(60))
///     .expiration_interval(Duration::ZERO)
///     .build_with_loader(|key: &u32| Ok(Some(key * 2)));
/// assert_eq!(cache.get(&21).unwrap(), Some(42));
/// ```
#[derive(Debug, Clone, Default)]
pub struct CacheBuilder {
    options: CacheOptions,
}

impl CacheBuilder {
    /// Create a builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing options, e.g. ones read with [`CacheOptions::from_env`].
    pub fn from_options(options: CacheOptions) -> Self {
        Self { options }
    }

    /// Expire entries this long after their last read or write.
    ///
    /// Default: disabled
    pub fn expire_after_access(mut self, duration: Duration) -> Self {
        self.options.expire_after_access = duration;
        self
    }

    /// Expire entries this long after their last write.
    ///
    /// Default: disabled
    pub fn expire_after_write(mut self, duration: Duration) -> Self {
        self.options.expire_after_write = duration;
        self
    }

    /// Remove expired entries, or only hide them from reads.
    ///
    /// Default: true
    pub fn delete_on_expiration(mut self, delete: bool) -> Self {
        self.options.delete_on_expiration = delete;
        self
    }

    /// Set the delay between background sweeps. Zero disables the sweeper.
    ///
    /// Default: 5 minutes
    pub fn expiration_interval(mut self, interval: Duration) -> Self {
        self.options.expiration_interval = interval;
        self
    }

    /// Maintain hit, miss, load and expire counters.
    ///
    /// Default: true
    pub fn record_stats(mut self, record: bool) -> Self {
        self.options.record_stats = record;
        self
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Build a plain store without loaders.
    pub fn build<K: CacheKey, V: CacheValue>(self) -> CacheStore<K, V> {
        CacheStore::new(self.options)
    }

    /// Build a loading cache with a single-key loader.
    pub fn build_with_loader<K, V, F>(self, loader: F) -> LoadingCache<K, V>
    where
        K: CacheKey,
        V: CacheValue,
        F: Fn(&K) -> LoadResult<V> + Send + Sync + 'static,
    {
        LoadingCache::new(self.options, loader)
    }

    /// Build a loading cache with a single-key and a batch loader.
    pub fn build_with_loaders<K, V, F, M>(self, loader: F, multi_loader: M) -> LoadingCache<K, V>
    where
        K: CacheKey,
        V: CacheValue,
        F: Fn(&K) -> LoadResult<V> + Send + Sync + 'static,
        M: Fn(&[K]) -> BatchResult<K, V> + Send + Sync + 'static,
    {
        LoadingCache::with_multi_loader(self.options, loader, multi_loader)
    }

    /// Build an async loading cache without loaders.
    pub fn build_async<K: CacheKey, V: CacheValue>(self) -> AsyncLoadingCache<K, V> {
        AsyncLoadingCache::from_parts(self.options, None, None)
    }

    /// Build an async loading cache with a single-key loader.
    pub fn build_async_with_loader<K, V, F, Fut>(self, loader: F) -> AsyncLoadingCache<K, V>
    where
        K: CacheKey,
        V: CacheValue,
        F: Fn(&K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
    {
        AsyncLoadingCache::new(self.options, loader)
    }

    /// Build an async loading cache with a single-key and a batch loader.
    pub fn build_async_with_loaders<K, V, F, Fut, M, MFut>(
        self,
        loader: F,
        multi_loader: M,
    ) -> AsyncLoadingCache<K, V>
    where
        K: CacheKey,
        V: CacheValue,
        F: Fn(&K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LoadResult<V>> + Send + 'static,
        M: Fn(&[K]) -> MFut + Send + Sync + 'static,
        MFut: Future<Output = BatchResult<K, V>> + Send + 'static,
    {
        AsyncLoadingCache::with_multi_loader(self.options, loader, multi_loader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_builder_default() {
        let builder = CacheBuilder::new();
        assert_eq!(builder.options(), &CacheOptions::default());

        let store: CacheStore<String, u32> = builder.build();
        assert!(store.is_empty());
    }

    #[test]
    fn test_builder_setters() {
        let builder = CacheBuilder::new()
            .expire_after_access(Duration::from_millis(10))
            .expire_after_write(Duration::from_millis(20))
            .delete_on_expiration(false)
            .expiration_interval(Duration::ZERO)
            .record_stats(false);

        let options = builder.options();
        assert_eq!(options.expire_after_access, Duration::from_millis(10));
        assert_eq!(options.expire_after_write, Duration::from_millis(20));
        assert!(!options.delete_on_expiration);
        assert!(options.expiration_interval.is_zero());
        assert!(!options.record_stats);
    }

    #[test]
    fn test_builder_from_options() {
        let options = CacheOptions {
            record_stats: false,
            ..CacheOptions::default()
        };

        let cache = CacheBuilder::from_options(options.clone()).build_with_loader(|k: &u32| Ok(Some(*k)));
        assert_eq!(cache.options(), &options);
    }

    #[test]
    fn test_builder_with_loaders() {
        let cache = CacheBuilder::new().build_with_loaders(
            |k: &u32| Ok(Some(k + 1)),
            |keys: &[u32]| Ok(keys.iter().map(|k| (*k, k + 100)).collect::<HashMap<_, _>>()),
        );

        assert_eq!(cache.get(&1).unwrap(), Some(2));
        let found = cache.get_all([1, 2]).unwrap();
        assert_eq!(found[&1], 2);
        assert_eq!(found[&2], 102);
    }

    #[tokio::test]
    async fn test_builder_async() {
        let cache = CacheBuilder::new().build_async_with_loader(|k: &u32| {
            let k = *k;
            async move { Ok(Some(k * 3)) }
        });
        assert_eq!(cache.get(&3).await.unwrap(), Some(9));

        let empty: AsyncLoadingCache<u32, u32> = CacheBuilder::new().build_async();
        assert_eq!(empty.get(&3).await.unwrap(), None);
    }
}
