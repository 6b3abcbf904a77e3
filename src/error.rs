//! Error types for the cache
//!
//! Provides unified error handling using thiserror.

use std::error::Error as StdError;
use std::sync::Arc;

use thiserror::Error;

/// Boxed error returned by user-supplied loaders.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// What a single-key loader produces.
///
/// `Ok(None)` means the loader had nothing for the key. That is a load failure
/// which is recorded in the stats, but it is not an error.
pub type LoadResult<V> = std::result::Result<Option<V>, BoxError>;

// == Cache Error Enum ==
/// Unified error type for the cache.
///
/// Cloneable so that one failed load can be handed to every caller waiting on it.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// The loader itself failed
    #[error("Loader failed: {0}")]
    Loader(Arc<dyn StdError + Send + Sync + 'static>),

    /// A pending load was dropped before it settled
    #[error("Load abandoned before completion")]
    Abandoned,

    /// A load was requested from a cache that has no loader
    #[error("No loader configured")]
    NoLoader,
}

impl CacheError {
    /// Wraps a loader error.
    pub fn loader(err: impl Into<BoxError>) -> Self {
        CacheError::Loader(Arc::from(err.into()))
    }
}

impl From<BoxError> for CacheError {
    fn from(err: BoxError) -> Self {
        CacheError::Loader(Arc::from(err))
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache.
pub type Result<T> = std::result::Result<T, CacheError>;
