//! Example: Building a mutex from a TOML settings file
//!
//! Run with: `cargo run --example from_settings -- path/to/mutex.toml`
//!
//! Without an argument a Redis configuration pointing at localhost is used.

use distribmu::MutexSettings;
use distribmu::prelude::*;
use std::time::Duration;
use tracing::info;

const DEFAULT_SETTINGS: &str = r#"
backend = "redis"
key = "job:42"
ttl_ms = 2000
holder_id = "worker-A"

[redis]
url = "redis://127.0.0.1:6379"
precision_ms = 100
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let source = match std::env::args().nth(1) {
        Some(path) => std::fs::read_to_string(path)?,
        None => DEFAULT_SETTINGS.to_string(),
    };

    let settings = MutexSettings::from_toml(&source)?;
    info!(backend = %settings.backend, key = %settings.key, "loaded mutex settings");

    let mut mutex = settings.connect().await?.build();
    let ctx = Context::background().with_timeout(Duration::from_secs(30));

    mutex
        .do_with_must_done(&ctx, Duration::from_secs(5), || async {
            info!("running exclusive job");
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok::<_, LockError>(())
        })
        .await?;
    info!("job finished and mutex released");

    Ok(())
}
