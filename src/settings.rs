//! Serde-friendly settings that connect to a backend and yield a [`MutexConfig`].

use std::time::Duration;

use distribmu_core::error::{LockError, LockResult};
use distribmu_etcd::EtcdV2Client;
use fred::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{BackendKind, EtcdDriverConfig, MutexConfig, RedisDriverConfig};

fn default_connect_timeout_ms() -> u64 {
    3000
}

fn default_precision_ms() -> u64 {
    100
}

/// Connection parameters for the etcd backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EtcdSettings {
    /// e.g. `http://127.0.0.1:2379`
    pub endpoint: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

/// Connection parameters for the Redis backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisSettings {
    /// e.g. `redis://127.0.0.1:6379`
    pub url: String,
    #[serde(default = "default_precision_ms")]
    pub precision_ms: u64,
}

/// Mutex settings as they appear in a configuration file.
///
/// ```toml
/// backend = "redis"
/// key = "job:42"
/// ttl_ms = 2000
/// holder_id = "worker-A"
///
/// [redis]
/// url = "redis://127.0.0.1:6379"
/// ```
///
/// Exactly the section named by `backend` must be present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutexSettings {
    pub backend: BackendKind,
    pub key: String,
    pub ttl_ms: u64,
    pub holder_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etcd: Option<EtcdSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisSettings>,
}

impl MutexSettings {
    /// Parses settings from a TOML document and validates them.
    pub fn from_toml(source: &str) -> LockResult<Self> {
        let settings: Self = toml::from_str(source)
            .map_err(|e| LockError::InvalidConfig(format!("invalid mutex settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks that the backend section matches `backend`, without connecting.
    pub fn validate(&self) -> LockResult<()> {
        let (present, other) = match self.backend {
            BackendKind::Etcd => (self.etcd.is_some(), self.redis.is_some()),
            BackendKind::Redis => (self.redis.is_some(), self.etcd.is_some()),
        };
        if !present {
            return Err(LockError::InvalidConfig(format!(
                "backend '{}' requires a [{}] section",
                self.backend, self.backend
            )));
        }
        if other {
            return Err(LockError::InvalidConfig(format!(
                "backend '{}' does not accept settings for another backend",
                self.backend
            )));
        }
        Ok(())
    }

    /// Creates the backend client and returns the validated configuration.
    ///
    /// For Redis this waits for the initial connection.
    pub async fn connect(self) -> LockResult<MutexConfig> {
        self.validate()?;
        let ttl = Duration::from_millis(self.ttl_ms);

        match (self.backend, self.etcd, self.redis) {
            (BackendKind::Etcd, Some(etcd), _) => {
                let client = EtcdV2Client::builder()
                    .endpoint(etcd.endpoint)
                    .connect_timeout(Duration::from_millis(etcd.connect_timeout_ms))
                    .build()?;
                info!(endpoint = %client.endpoint(), key = %self.key, "using etcd mutex backend");
                MutexConfig::new(
                    BackendKind::Etcd,
                    self.key,
                    ttl,
                    self.holder_id,
                    EtcdDriverConfig::new(client),
                )
            }
            (BackendKind::Redis, _, Some(redis)) => {
                let client = connect_redis(&redis.url).await?;
                info!(url = %redis.url, key = %self.key, "using redis mutex backend");
                MutexConfig::new(
                    BackendKind::Redis,
                    self.key,
                    ttl,
                    self.holder_id,
                    RedisDriverConfig::new(client)
                        .precision(Duration::from_millis(redis.precision_ms)),
                )
            }
            (backend, _, _) => Err(LockError::InvalidConfig(format!(
                "backend '{}' requires a [{}] section",
                backend, backend
            ))),
        }
    }
}

async fn connect_redis(url: &str) -> LockResult<RedisClient> {
    let config = RedisConfig::from_url(url).map_err(|e| {
        LockError::InvalidConfig(format!("invalid Redis URL '{}': {}", url, e))
    })?;

    let client = RedisClient::new(config, None, None, None);
    client.connect();
    client.wait_for_connect().await.map_err(|e| {
        LockError::Connection(Box::new(std::io::Error::other(format!(
            "failed to connect to Redis: {}",
            e
        ))))
    })?;

    Ok(client)
}
