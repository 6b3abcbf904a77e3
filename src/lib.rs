//! Loading Cache - An in-process key-value cache
//!
//! Provides time-based expiration, read-through loading and request
//! coalescing for concurrent asynchronous loads.

pub mod builder;
pub mod cache;
pub mod config;
pub mod error;
pub(crate) mod tasks;

pub use builder::CacheBuilder;
pub use cache::{
    AsyncLoader, AsyncLoadingCache, AsyncMultiLoader, BatchResult, CacheEntry, CacheEvent, CacheKey,
    CacheStats, CacheStore, CacheValue, Completer, EventKind, ListenerId, LoadHandle, Loader,
    LoadingCache, MultiLoader, StatKind, StatsSnapshot,
};
pub use config::CacheOptions;
pub use error::{BoxError, CacheError, LoadResult, Result};
