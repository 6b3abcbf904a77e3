//! Expiration Sweep Task
//!
//! Background task that periodically removes expired cache entries.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Weak;
use std::thread;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, CacheValue, StoreInner};

// == Sweep Task ==
/// Handle to a running sweep, owned by the store.
#[derive(Debug)]
pub(crate) enum SweepTask {
    /// Sweep running on the tokio runtime the store was created in
    Tokio(JoinHandle<()>),
    /// Sweep running on a dedicated thread; dropping the sender stops it
    Thread(Sender<()>),
}

impl SweepTask {
    /// Stops the sweep. A sweep in progress finishes first.
    pub(crate) fn stop(self) {
        match self {
            SweepTask::Tokio(handle) => handle.abort(),
            SweepTask::Thread(stop) => drop(stop),
        }
    }
}

/// Spawns a background task that periodically sweeps expired entries.
///
/// Each run schedules the next one only after it has finished, so a slow
/// sweep stretches the effective period. The task holds a weak reference and
/// stops on its own once the store is gone; the owning store stops it on
/// `end`.
///
/// # Arguments
/// * `store` - Weak reference to the store internals
/// * `interval` - Delay between the end of one sweep and the start of the next
///
/// # Returns
/// A tokio task when called inside a runtime, otherwise a dedicated thread.
/// `None` only if the thread could not be started.
pub(crate) fn spawn_sweep_task<K: CacheKey, V: CacheValue>(
    store: Weak<StoreInner<K, V>>,
    interval: Duration,
) -> Option<SweepTask> {
    match Handle::try_current() {
        Ok(runtime) => Some(SweepTask::Tokio(runtime.spawn(async move {
            info!("Starting expiration sweep task with interval of {:?}", interval);

            loop {
                tokio::time::sleep(interval).await;
                if !sweep_once(&store) {
                    break;
                }
            }
        }))),
        Err(_) => spawn_sweep_thread(store, interval),
    }
}

fn spawn_sweep_thread<K: CacheKey, V: CacheValue>(
    store: Weak<StoreInner<K, V>>,
    interval: Duration,
) -> Option<SweepTask> {
    let (stop, stopped) = mpsc::channel::<()>();
    let spawned = thread::Builder::new()
        .name("cache-sweeper".to_string())
        .spawn(move || {
            info!("Starting expiration sweep thread with interval of {:?}", interval);

            loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        if !sweep_once(&store) {
                            break;
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                        debug!("Expiration sweep thread stopped");
                        break;
                    }
                }
            }
        });

    match spawned {
        Ok(_) => Some(SweepTask::Thread(stop)),
        Err(err) => {
            warn!(
                "Failed to start sweep thread, expired entries will only be removed on read: {}",
                err
            );
            None
        }
    }
}

/// Runs one sweep. Returns false once the store is gone.
fn sweep_once<K: CacheKey, V: CacheValue>(store: &Weak<StoreInner<K, V>>) -> bool {
    let Some(store) = store.upgrade() else {
        debug!("Cache dropped, stopping expiration sweep");
        return false;
    };
    let removed = store.sweep_expired();
    drop(store);

    if removed > 0 {
        info!("Expiration sweep: removed {} expired entries", removed);
    } else {
        debug!("Expiration sweep: no expired entries found");
    }
    true
}
