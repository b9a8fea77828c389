//! Redis-backed keyed store.
//!
//! Compound operations run as `MULTI`/`EXEC` pipelines so concurrent
//! callers for the same key never interleave between the steps.

use std::collections::HashMap;
use std::time::Duration;

use redis::aio::ConnectionManager;
use tracing::{debug, warn};
use warden_core::error::WardenResult;
use warden_core::store::KeyedStore;

use super::ttl_millis;
use crate::connection::RedisConfig;
use crate::error::StoreError;

#[derive(Clone)]
pub struct RedisKeyedStore {
    conn: ConnectionManager,
}

impl RedisKeyedStore {
    /// Connect and verify the server answers `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str()).map_err(|e| {
            warn!(error = %e, "Failed to create Redis client");
            StoreError::from(e)
        })?;

        let mut conn = ConnectionManager::new(client).await?;
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        debug!(reply = %pong, "Connected to Redis keyed store");

        Ok(Self { conn })
    }

    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl KeyedStore for RedisKeyedStore {
    async fn get(&self, key: &str) -> WardenResult<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> WardenResult<()> {
        let mut conn = self.conn();
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> WardenResult<bool> {
        let mut conn = self.conn();
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> WardenResult<bool> {
        let mut conn = self.conn();
        let updated: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(updated == 1)
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> WardenResult<i64> {
        let mut conn = self.conn();
        let (value,): (i64,) = redis::pipe()
            .atomic()
            .cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(value)
    }

    async fn window_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        member: &str,
    ) -> WardenResult<u64> {
        let cutoff = now_ms - ttl_millis(window);
        let mut conn = self.conn();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(cutoff)
            .ignore()
            .cmd("ZADD")
            .arg(key)
            .arg(now_ms)
            .arg(member)
            .ignore()
            .cmd("ZCARD")
            .arg(key)
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(window))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(count)
    }

    async fn window_count(&self, key: &str, now_ms: i64, window: Duration) -> WardenResult<u64> {
        let cutoff = now_ms - ttl_millis(window);
        let mut conn = self.conn();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(key)
            .arg("-inf")
            .arg(cutoff)
            .ignore()
            .cmd("ZCARD")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(count)
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> WardenResult<()> {
        let mut conn = self.conn();
        let _: () = redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(key)
            .arg(member)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> WardenResult<()> {
        let mut conn = self.conn();
        let _: i64 = redis::cmd("SREM")
            .arg(key)
            .arg(member)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> WardenResult<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(members)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> WardenResult<()> {
        let mut conn = self.conn();
        let _: () = redis::pipe()
            .atomic()
            .cmd("HSET")
            .arg(key)
            .arg(field)
            .arg(value)
            .ignore()
            .cmd("PEXPIRE")
            .arg(key)
            .arg(ttl_millis(ttl))
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> WardenResult<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(value)
    }

    async fn hash_get_all(&self, key: &str) -> WardenResult<HashMap<String, String>> {
        let mut conn = self.conn();
        let entries: HashMap<String, String> = redis::cmd("HGETALL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(entries)
    }

    async fn hash_delete(&self, key: &str, field: &str) -> WardenResult<()> {
        let mut conn = self.conn();
        let _: i64 = redis::cmd("HDEL")
            .arg(key)
            .arg(field)
            .query_async(&mut conn)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }
}
