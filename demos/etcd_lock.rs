//! Example: Two workers contending on an etcd-backed mutex
//!
//! Run with: `cargo run --example etcd_lock`
//!
//! Requires an etcd server exposing the v2 keys API. Set ETCD_URL
//! environment variable or modify the URL below.

use distribmu::prelude::*;
use distribmu::{EtcdMutex, EtcdV2Client};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "distribmu_etcd=debug".into()),
        )
        .with_target(false)
        .init();

    let etcd_url = std::env::var("ETCD_URL").unwrap_or_else(|_| "http://127.0.0.1:2379".to_string());
    let client = EtcdV2Client::builder()
        .endpoint(etcd_url)
        .connect_timeout(Duration::from_secs(2))
        .build()?;

    let ctx = Context::background();
    let mut worker_a = EtcdMutex::new(client.clone(), "/distribmu/job-42", "worker-A", Duration::from_secs(2));
    if !worker_a.lock(&ctx).await? {
        println!("Key is already held, try again later");
        return Ok(());
    }
    println!("worker-A holds the mutex");

    let start = Instant::now();
    let waiter = tokio::spawn(async move {
        let mut worker_b = EtcdMutex::new(client, "/distribmu/job-42", "worker-B", Duration::from_secs(2));
        let ctx = Context::background();
        let acquired = worker_b.lock_wait(&ctx, Duration::from_secs(5)).await?;
        if acquired {
            println!("worker-B acquired the mutex after {:?}", start.elapsed());
            worker_b.unlock(&ctx, false).await?;
        }
        Ok::<_, LockError>(acquired)
    });

    // worker-B is woken by the watch as soon as this delete lands
    tokio::time::sleep(Duration::from_secs(1)).await;
    worker_a.unlock(&ctx, false).await?;
    println!("worker-A released the mutex");

    let acquired = waiter.await??;
    println!("worker-B acquired: {}", acquired);

    Ok(())
}
