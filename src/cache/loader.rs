//! Loader types bound to loading caches at construction.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{BoxError, LoadResult};

/// What a batch loader produces: values for the keys it could resolve.
pub type BatchResult<K, V> = std::result::Result<HashMap<K, V>, BoxError>;

/// Loads a single missing key.
pub type Loader<K, V> = Arc<dyn Fn(&K) -> LoadResult<V> + Send + Sync>;

/// Loads many missing keys in one call.
pub type MultiLoader<K, V> = Arc<dyn Fn(&[K]) -> BatchResult<K, V> + Send + Sync>;

/// Starts an asynchronous load of a single key.
pub type AsyncLoader<K, V> = Arc<dyn Fn(&K) -> BoxFuture<'static, LoadResult<V>> + Send + Sync>;

/// Starts an asynchronous load of many keys.
pub type AsyncMultiLoader<K, V> =
    Arc<dyn Fn(&[K]) -> BoxFuture<'static, BatchResult<K, V>> + Send + Sync>;
