//! Shared load handles
//!
//! A [`LoadHandle`] is the value an [`AsyncLoadingCache`](crate::AsyncLoadingCache)
//! stores: a clonable, single-assignment future. Every clone observes the same
//! eventual result. A pending handle is settled through its [`Completer`],
//! which is consumed on use, so a load can never be resolved twice.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::error::{CacheError, Result};

static NEXT_LOAD_ID: AtomicU64 = AtomicU64::new(0);

type SharedLoad<V> = Shared<BoxFuture<'static, Result<Option<V>>>>;

// == Load Handle ==
/// A shared future resolving to the loaded value.
///
/// Resolves to `Ok(None)` when the loader had nothing for the key and to an
/// error when the loader failed or was abandoned.
pub struct LoadHandle<V> {
    id: u64,
    inner: SharedLoad<V>,
}

impl<V: Clone + Send + Sync + 'static> LoadHandle<V> {
    fn from_boxed(future: BoxFuture<'static, Result<Option<V>>>) -> Self {
        Self {
            id: NEXT_LOAD_ID.fetch_add(1, Ordering::Relaxed),
            inner: future.shared(),
        }
    }

    /// Creates an unsettled handle together with the means to settle it.
    pub fn pending() -> (Self, Completer<V>) {
        let (sender, receiver) = oneshot::channel();
        let future = receiver
            .map(|received| received.unwrap_or(Err(CacheError::Abandoned)))
            .boxed();
        (Self::from_boxed(future), Completer { sender })
    }

    /// Creates an already resolved handle.
    pub fn ready(value: Option<V>) -> Self {
        Self::from_boxed(future::ready(Ok(value)).boxed())
    }

    /// Creates an already failed handle.
    pub fn failed(err: CacheError) -> Self {
        Self::from_boxed(future::ready(Err(err)).boxed())
    }

    /// Returns the result if some clone has already observed it.
    pub fn peek(&self) -> Option<&Result<Option<V>>> {
        self.inner.peek()
    }
}

impl<V> LoadHandle<V> {
    /// Returns true if both handles belong to the same load.
    pub fn same_load(&self, other: &Self) -> bool {
        self.id == other.id
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }
}

impl<V> Clone for LoadHandle<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: self.inner.clone(),
        }
    }
}

impl<V: Clone> Future for LoadHandle<V> {
    type Output = Result<Option<V>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}

impl<V> fmt::Debug for LoadHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadHandle").field("id", &self.id).finish()
    }
}

impl<V> PartialEq for LoadHandle<V> {
    fn eq(&self, other: &Self) -> bool {
        self.same_load(other)
    }
}

// == Completer ==
/// The settling side of a pending [`LoadHandle`].
///
/// Dropping it without calling [`Completer::complete`] resolves the handle to
/// [`CacheError::Abandoned`].
#[must_use = "dropping a Completer abandons its load"]
pub struct Completer<V> {
    sender: oneshot::Sender<Result<Option<V>>>,
}

impl<V> Completer<V> {
    /// Settles the handle. Every clone of it observes `result`.
    pub fn complete(self, result: Result<Option<V>>) {
        if self.sender.send(result).is_err() {
            debug!("Load settled after every handle was dropped");
        }
    }
}

impl<V> fmt::Debug for Completer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").finish_non_exhaustive()
    }
}
