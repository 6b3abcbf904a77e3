//! Async loading cache demo
//!
//! Fires concurrent requests for the same keys against a slow loader and
//! shows that each key is loaded only once.
//!
//! Run with `cargo run --example async`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loading_cache::{AsyncLoadingCache, CacheOptions};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loading_cache=info,async=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = loads.clone();
    let options = CacheOptions {
        expire_after_access: Duration::from_secs(5 * 60),
        expire_after_write: Duration::from_secs(10 * 60),
        ..CacheOptions::from_env()
    };
    let cache = Arc::new(AsyncLoadingCache::new(options, move |key: &String| {
        counter.fetch_add(1, Ordering::SeqCst);
        let key = key.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(Some(key.len() as u64 * 100))
        }
    }));

    let mut tasks = Vec::new();
    for i in 0..20 {
        let cache = cache.clone();
        let key = format!("key-{}", i % 4);
        tasks.push(tokio::spawn(async move { (key.clone(), cache.get(&key).await) }));
    }
    for task in tasks {
        let (key, value) = task.await?;
        info!("{} => {:?}", key, value?);
    }

    info!(
        "Loader ran {} times for 20 requests; stats {}",
        loads.load(Ordering::SeqCst),
        cache.stats()
    );

    cache.end();
    Ok(())
}
