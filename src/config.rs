//! Mutex configuration and driver dispatch.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use distribmu_core::error::{LockError, LockResult};
use distribmu_etcd::{EtcdMutex, EtcdV2Client};
use distribmu_redis::{DEFAULT_PRECISION, RedisMutex};
use fred::prelude::RedisClient;
use serde::{Deserialize, Serialize};

use crate::mutex::AnyMutex;

/// Backend a mutex is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// etcd v2 keys API (watch-based waiting).
    Etcd,
    /// Redis (poll-based waiting).
    Redis,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Etcd => "etcd",
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = LockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "etcd" => Ok(Self::Etcd),
            "redis" => Ok(Self::Redis),
            other => Err(LockError::InvalidConfig(format!(
                "unsupported backend type '{}'",
                other
            ))),
        }
    }
}

/// etcd-specific driver parameters.
#[derive(Debug, Clone)]
pub struct EtcdDriverConfig {
    pub client: EtcdV2Client,
}

impl EtcdDriverConfig {
    pub fn new(client: EtcdV2Client) -> Self {
        Self { client }
    }
}

/// Redis-specific driver parameters.
#[derive(Clone)]
pub struct RedisDriverConfig {
    pub client: RedisClient,
    /// Polling granularity of the wait loops.
    pub precision: Duration,
}

impl RedisDriverConfig {
    /// Uses [`DEFAULT_PRECISION`] for polling.
    pub fn new(client: RedisClient) -> Self {
        Self {
            client,
            precision: DEFAULT_PRECISION,
        }
    }

    pub fn precision(mut self, precision: Duration) -> Self {
        self.precision = precision;
        self
    }
}

impl fmt::Debug for RedisDriverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisDriverConfig")
            .field("precision", &self.precision)
            .finish_non_exhaustive()
    }
}

/// Backend-specific payload of a [`MutexConfig`].
#[derive(Debug, Clone)]
pub enum DriverConfig {
    Etcd(EtcdDriverConfig),
    Redis(RedisDriverConfig),
}

impl DriverConfig {
    /// The backend this payload belongs to.
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Etcd(_) => BackendKind::Etcd,
            Self::Redis(_) => BackendKind::Redis,
        }
    }
}

impl From<EtcdDriverConfig> for DriverConfig {
    fn from(config: EtcdDriverConfig) -> Self {
        Self::Etcd(config)
    }
}

impl From<RedisDriverConfig> for DriverConfig {
    fn from(config: RedisDriverConfig) -> Self {
        Self::Redis(config)
    }
}

/// Validated description of one mutex.
///
/// Validation happens once, in [`MutexConfig::new`]. A configuration error is
/// a programming error on the caller's side: it is returned as
/// [`LockError::InvalidConfig`] so the embedding process decides how to fail,
/// and retrying it is pointless.
///
/// # Example
///
/// ```rust,ignore
/// let config = MutexConfig::new(
///     BackendKind::Etcd,
///     "job:42",
///     Duration::from_secs(2),
///     "worker-A",
///     EtcdDriverConfig::new(EtcdV2Client::new("http://127.0.0.1:2379")?),
/// )?;
/// let mut mutex = config.build();
/// ```
#[derive(Debug, Clone)]
pub struct MutexConfig {
    kind: BackendKind,
    key: String,
    ttl: Duration,
    holder_id: String,
    driver: DriverConfig,
}

impl MutexConfig {
    /// Validates the configuration.
    ///
    /// Fails when `kind` does not match the payload, the key or holder id is
    /// empty, the TTL is zero, or the Redis precision is zero.
    pub fn new(
        kind: BackendKind,
        key: impl Into<String>,
        ttl: Duration,
        holder_id: impl Into<String>,
        driver: impl Into<DriverConfig>,
    ) -> LockResult<Self> {
        let key = key.into();
        let holder_id = holder_id.into();
        let driver = driver.into();

        if driver.kind() != kind {
            return Err(LockError::InvalidConfig(format!(
                "backend type '{}' does not match '{}' driver configuration",
                kind,
                driver.kind()
            )));
        }
        if key.is_empty() {
            return Err(LockError::InvalidConfig("lock key is empty".to_string()));
        }
        if holder_id.is_empty() {
            return Err(LockError::InvalidConfig("holder id is empty".to_string()));
        }
        if ttl.is_zero() {
            return Err(LockError::InvalidConfig("ttl must be positive".to_string()));
        }
        if matches!(&driver, DriverConfig::Redis(redis) if redis.precision.is_zero()) {
            return Err(LockError::InvalidConfig(
                "redis precision must be positive".to_string(),
            ));
        }

        Ok(Self {
            kind,
            key,
            ttl,
            holder_id,
            driver,
        })
    }

    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn driver(&self) -> &DriverConfig {
        &self.driver
    }

    /// Constructs the driver matching the configured backend.
    pub fn build(self) -> AnyMutex {
        match self.driver {
            DriverConfig::Etcd(etcd) => {
                AnyMutex::Etcd(EtcdMutex::new(etcd.client, self.key, self.holder_id, self.ttl))
            }
            DriverConfig::Redis(redis) => AnyMutex::Redis(RedisMutex::with_precision(
                redis.client,
                self.key,
                self.holder_id,
                self.ttl,
                redis.precision,
            )),
        }
    }
}

/// Constructs the driver described by `config`.
pub fn new_mutex(config: MutexConfig) -> AnyMutex {
    config.build()
}
