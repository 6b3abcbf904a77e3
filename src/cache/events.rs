//! Cache Events Module
//!
//! Observer registration for expiration, statistics and error notifications.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::error;

use crate::cache::StatKind;

// == Cache Event ==
/// A notification raised by a cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEvent<K, V> {
    /// An entry was removed because it expired
    Expire { key: K, value: V },
    /// A counter changed by `delta`; `previous` is its value before the change
    Stat {
        kind: StatKind,
        delta: u64,
        previous: u64,
    },
    /// A listener failed while handling another event
    Error { message: String },
}

/// The kind of a [`CacheEvent`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Expire,
    Stat,
    Error,
}

impl<K, V> CacheEvent<K, V> {
    pub fn kind(&self) -> EventKind {
        match self {
            CacheEvent::Expire { .. } => EventKind::Expire,
            CacheEvent::Stat { .. } => EventKind::Stat,
            CacheEvent::Error { .. } => EventKind::Error,
        }
    }
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<K, V> = Arc<dyn Fn(&CacheEvent<K, V>) + Send + Sync>;

// == Event Hub ==
/// Registry of listeners for one cache.
///
/// Listeners are invoked outside of any cache lock, so a listener may call
/// back into the cache. A panicking listener is caught and logged; it never
/// aborts the operation that raised the event.
pub struct EventHub<K, V> {
    listeners: RwLock<Vec<(ListenerId, Listener<K, V>)>>,
    next_id: AtomicU64,
}

impl<K, V> EventHub<K, V> {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Registers a listener for every event kind.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&CacheEvent<K, V>) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener. Returns false if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    // == Emit ==
    /// Delivers an event to every listener.
    pub fn emit(&self, event: &CacheEvent<K, V>) {
        // Snapshot so listeners can (un)subscribe while being called.
        let listeners: Vec<_> = self.listeners.read().clone();
        if listeners.is_empty() {
            return;
        }

        let mut failures = Vec::new();
        for (id, listener) in &listeners {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| listener(event)));
            if let Err(payload) = outcome {
                let message = panic_message(payload.as_ref());
                error!(
                    "Cache listener {:?} panicked on {:?} event: {}",
                    id,
                    event.kind(),
                    message
                );
                failures.push((*id, message));
            }
        }

        // Failures while reporting failures are only logged.
        if event.kind() == EventKind::Error {
            return;
        }
        for (failed, message) in failures {
            let report = CacheEvent::Error {
                message: format!("listener {:?} failed: {}", failed, message),
            };
            for (id, listener) in &listeners {
                if *id == failed {
                    continue;
                }
                if panic::catch_unwind(AssertUnwindSafe(|| listener(&report))).is_err() {
                    error!("Cache listener {:?} panicked on Error event", id);
                }
            }
        }
    }
}

impl<K, V> Default for EventHub<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for EventHub<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
