//! Redis store backend over a deadpool-managed connection pool.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use crate::{KeyGuard, KeyWrite, KvStore, StoreError, StoreResult};

/// The production `KvStore` backend.
///
/// The multi-key compare-and-swap runs `WATCH`/`MULTI`/`EXEC` on a pooled
/// connection; the connection is held exclusively for the duration of the
/// transaction, so a concurrent writer touching any guarded key aborts the
/// `EXEC` and the caller retries.
#[derive(Clone)]
pub struct RedisKvStore {
    pool: Pool,
}

impl RedisKvStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Builds a pool from a `redis://` URL (password inline per the URL
    /// scheme; it never appears in logs).
    pub fn from_url(url: &str) -> StoreResult<Self> {
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::unavailable(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Verifies connectivity with a `PING`.
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.get(key).await?)
    }

    async fn put(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        guards: &[KeyGuard],
        writes: &[KeyWrite],
    ) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;

        let mut watch = redis::cmd("WATCH");
        for guard in guards {
            watch.arg(&guard.key);
        }
        watch.query_async::<()>(&mut conn).await?;

        // Validate every guard under WATCH; a mismatch means the caller's
        // read is stale and the transaction must not run.
        for guard in guards {
            let current: Option<String> = conn.get(&guard.key).await?;
            if current != guard.expected {
                redis::cmd("UNWATCH").query_async::<()>(&mut conn).await?;
                return Ok(false);
            }
        }

        let mut pipe = redis::pipe();
        pipe.atomic();
        for write in writes {
            match &write.value {
                Some(value) => {
                    pipe.set(&write.key, value).ignore();
                }
                None => {
                    pipe.del(&write.key).ignore();
                }
            }
        }

        // EXEC returns nil when a watched key changed between GET and EXEC.
        let outcome: Option<()> = pipe.query_async(&mut conn).await?;
        Ok(outcome.is_some())
    }

    async fn keys_with_prefix(&self, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let pattern = format!("{prefix}*");
        let mut keys = Vec::new();
        {
            let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(&pattern).await?;
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added == 1)
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed == 1)
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        Ok(conn.sismember(key, member).await?)
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        Ok(conn.smembers(key).await?)
    }
}
