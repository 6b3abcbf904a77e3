//! Synchronous loading cache demo
//!
//! Builds a loading cache with both expiration policies, loads a few keys and
//! prints the resulting statistics.
//!
//! Run with `cargo run --example sync`. Set `RUST_LOG=loading_cache=debug`
//! for more detail.

use std::time::Duration;

use loading_cache::{CacheBuilder, CacheEvent};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loading_cache=info,sync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // No runtime here, so the sweep runs on its own thread
    let cache = CacheBuilder::new()
        .expire_after_write(Duration::from_secs(10 * 60))
        .expire_after_access(Duration::from_secs(5 * 60))
        .build_with_loader(|key: &String| Ok(Some(key.len() * 100)));

    cache.subscribe(|event| {
        if let CacheEvent::Expire { key, value } = event {
            info!("Expired {} => {}", key, value);
        }
    });

    for key in ["alpha", "beta", "alpha", "gamma"] {
        let value = cache.get(&key.to_string())?;
        info!("{} => {:?}", key, value);
    }

    let batch = cache.get_all(["beta", "delta"].map(String::from))?;
    info!("Batch: {:?}", batch);

    let stats = cache.stats().snapshot();
    info!("Stats: {} (hit rate {:.2})", stats, stats.hit_rate());

    cache.end();
    Ok(())
}
