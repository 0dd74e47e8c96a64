//! Example: Using the Redis distributed mutex
//!
//! Run with: `cargo run --example redis_lock`
//!
//! Requires a Redis server. Set REDIS_URL environment variable
//! or modify the URL below.

use distribmu::prelude::*;
use distribmu::{BackendKind, MutexConfig, RedisDriverConfig};
use fred::prelude::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "distribmu=debug,distribmu_redis=debug".into()),
        )
        .with_target(false)
        .init();

    // Get Redis URL from environment or use default
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());

    println!("Connecting to Redis...");
    let client = RedisClient::new(RedisConfig::from_url(&redis_url)?, None, None, None);
    client.connect();
    client.wait_for_connect().await?;

    let config = MutexConfig::new(
        BackendKind::Redis,
        "example-resource",
        Duration::from_secs(3),
        format!("demo-{}", std::process::id()),
        RedisDriverConfig::new(client).precision(Duration::from_millis(50)),
    )?;
    let mut mutex = config.build();
    let ctx = Context::background();

    // Wait up to 5 seconds for the key to be free
    println!("Acquiring mutex with 5 second timeout...");
    if !mutex.lock_wait(&ctx, Duration::from_secs(5)).await? {
        println!("Mutex is still held by someone else, giving up");
        return Ok(());
    }
    println!("Mutex acquired, lease ends in {:?}", mutex.ttl());

    // Work longer than the TTL, refreshing the lease as we go
    for step in 1..=3 {
        tokio::time::sleep(Duration::from_secs(2)).await;
        match mutex.refresh_ttl(&ctx).await {
            Ok(()) => println!("Step {} done, lease refreshed", step),
            Err(e) if e.is_lock_lost() => {
                println!("Lost the mutex during step {}: {}", step, e);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
    }

    mutex.unlock(&ctx, false).await?;
    println!("Mutex released");

    // The same flow through the retry helper
    let total = mutex
        .do_with_max_retry(&ctx, 3, Duration::from_secs(1), || async {
            println!("Doing critical work...");
            Ok::<_, LockError>(40 + 2)
        })
        .await?;
    println!("Critical work returned {}", total);

    Ok(())
}
