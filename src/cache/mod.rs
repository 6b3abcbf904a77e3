//! Cache Module
//!
//! Provides in-memory caching with time-based expiration and read-through
//! loading, for both plain and asynchronously loaded values.

mod async_loading;
mod entry;
mod events;
mod handle;
mod loader;
mod loading;
mod stats;
mod store;


use std::hash::Hash;

// Re-export public types
pub use async_loading::AsyncLoadingCache;
pub use entry::CacheEntry;
pub use events::{CacheEvent, EventHub, EventKind, ListenerId};
pub use handle::{Completer, LoadHandle};
pub use loader::{AsyncLoader, AsyncMultiLoader, BatchResult, Loader, MultiLoader};
pub use loading::LoadingCache;
pub use stats::{CacheStats, StatKind, StatsSnapshot};
pub use store::CacheStore;

pub(crate) use store::StoreInner;

/// Bounds every cache key satisfies.
pub trait CacheKey: Eq + Hash + Clone + Send + Sync + 'static {}

impl<T> CacheKey for T where T: Eq + Hash + Clone + Send + Sync + 'static {}

/// Bounds every cached value satisfies.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Send + Sync + 'static {}
