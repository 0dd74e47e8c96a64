//! Backend-erased mutex returned by the factory.

use std::time::Duration;

use distribmu_core::context::Context;
use distribmu_core::error::LockResult;
use distribmu_core::traits::DistributedMutex;
use distribmu_etcd::{EtcdMutex, EtcdV2Client};
use distribmu_redis::RedisMutex;
use fred::prelude::RedisClient;
use tokio::time::Instant;

use crate::config::BackendKind;

/// A mutex over whichever backend the configuration selected.
pub enum AnyMutex {
    Etcd(EtcdMutex<EtcdV2Client>),
    Redis(RedisMutex<RedisClient>),
}

impl AnyMutex {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Etcd(_) => BackendKind::Etcd,
            Self::Redis(_) => BackendKind::Redis,
        }
    }
}

impl From<EtcdMutex<EtcdV2Client>> for AnyMutex {
    fn from(mutex: EtcdMutex<EtcdV2Client>) -> Self {
        Self::Etcd(mutex)
    }
}

impl From<RedisMutex<RedisClient>> for AnyMutex {
    fn from(mutex: RedisMutex<RedisClient>) -> Self {
        Self::Redis(mutex)
    }
}

impl DistributedMutex for AnyMutex {
    fn key(&self) -> &str {
        match self {
            Self::Etcd(m) => m.key(),
            Self::Redis(m) => m.key(),
        }
    }

    fn holder_id(&self) -> &str {
        match self {
            Self::Etcd(m) => m.holder_id(),
            Self::Redis(m) => m.holder_id(),
        }
    }

    fn ttl(&self) -> Duration {
        match self {
            Self::Etcd(m) => m.ttl(),
            Self::Redis(m) => m.ttl(),
        }
    }

    fn expire_time(&self) -> Option<Instant> {
        match self {
            Self::Etcd(m) => m.expire_time(),
            Self::Redis(m) => m.expire_time(),
        }
    }

    async fn lock(&mut self, ctx: &Context) -> LockResult<bool> {
        match self {
            Self::Etcd(m) => m.lock(ctx).await,
            Self::Redis(m) => m.lock(ctx).await,
        }
    }

    async fn lock_wait(&mut self, ctx: &Context, timeout: Duration) -> LockResult<bool> {
        match self {
            Self::Etcd(m) => m.lock_wait(ctx, timeout).await,
            Self::Redis(m) => m.lock_wait(ctx, timeout).await,
        }
    }

    async fn wait_key_release(&self, ctx: &Context, timeout: Duration) -> LockResult<()> {
        match self {
            Self::Etcd(m) => m.wait_key_release(ctx, timeout).await,
            Self::Redis(m) => m.wait_key_release(ctx, timeout).await,
        }
    }

    async fn unlock(&mut self, ctx: &Context, force: bool) -> LockResult<()> {
        match self {
            Self::Etcd(m) => m.unlock(ctx, force).await,
            Self::Redis(m) => m.unlock(ctx, force).await,
        }
    }

    async fn refresh_ttl(&mut self, ctx: &Context) -> LockResult<()> {
        match self {
            Self::Etcd(m) => m.refresh_ttl(ctx).await,
            Self::Redis(m) => m.refresh_ttl(ctx).await,
        }
    }
}
