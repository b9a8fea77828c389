//! Collaborator traits for data access.
//!
//! All shared cross-request state lives behind [`KeyedStore`] so the
//! services stay stateless and horizontally scalable. Every key carries a
//! TTL matching its semantic lifetime. Compound operations that must not
//! interleave with concurrent callers (sliding-window hits, counter
//! increments) are single trait methods that implementations execute
//! atomically.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use crate::error::{WardenError, WardenResult};
use crate::models::account::{Account, CreateAccount};

// ---------------------------------------------------------------------------
// Shared keyed store (ephemeral state)
// ---------------------------------------------------------------------------

/// Keyspace and latency bound shared by every keyed-store caller.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix prepended to every key (default: `warden`).
    pub key_prefix: String,
    /// Upper bound for a single store round trip (default: 250 ms).
    pub operation_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "warden".into(),
            operation_timeout_ms: 250,
        }
    }
}

impl StoreConfig {
    /// Join `parts` under the configured prefix with `:`.
    pub fn key(&self, parts: &[&str]) -> String {
        let mut key = self.key_prefix.clone();
        for part in parts {
            key.push(':');
            key.push_str(part);
        }
        key
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

pub trait KeyedStore: Send + Sync {
    fn get(&self, key: &str) -> impl Future<Output = WardenResult<Option<String>>> + Send;

    /// Set a string value with a TTL, replacing any previous value.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    /// Returns whether the key existed.
    fn delete(&self, key: &str) -> impl Future<Output = WardenResult<bool>> + Send;

    /// Refresh a key's TTL. Returns whether the key existed.
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = WardenResult<bool>> + Send;

    /// Atomically add `delta` to an integer (missing = 0) and set its TTL.
    fn incr_by(
        &self,
        key: &str,
        delta: i64,
        ttl: Duration,
    ) -> impl Future<Output = WardenResult<i64>> + Send;

    /// Sliding-window hit, executed as one atomic unit: drop entries older
    /// than `now_ms - window`, insert `member` scored `now_ms`, count what
    /// remains, and refresh the key's TTL to `window`.
    fn window_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        member: &str,
    ) -> impl Future<Output = WardenResult<u64>> + Send;

    /// Prune and count a sliding window without inserting.
    fn window_count(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
    ) -> impl Future<Output = WardenResult<u64>> + Send;

    fn set_add(
        &self,
        key: &str,
        member: &str,
        ttl: Duration,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    fn set_remove(&self, key: &str, member: &str) -> impl Future<Output = WardenResult<()>> + Send;

    fn set_members(&self, key: &str) -> impl Future<Output = WardenResult<Vec<String>>> + Send;

    fn hash_set(
        &self,
        key: &str,
        field: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = WardenResult<()>> + Send;

    fn hash_get(
        &self,
        key: &str,
        field: &str,
    ) -> impl Future<Output = WardenResult<Option<String>>> + Send;

    fn hash_get_all(
        &self,
        key: &str,
    ) -> impl Future<Output = WardenResult<HashMap<String, String>>> + Send;

    fn hash_delete(&self, key: &str, field: &str) -> impl Future<Output = WardenResult<()>> + Send;
}

/// Run a store call with an upper bound on its latency. Elapsed calls
/// become [`WardenError::Store`].
pub async fn bounded<T>(
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = WardenResult<T>>,
) -> WardenResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(WardenError::Store(format!(
            "{operation} timed out after {}ms",
            limit.as_millis()
        ))),
    }
}

// ---------------------------------------------------------------------------
// Durable account store
// ---------------------------------------------------------------------------

pub trait AccountStore: Send + Sync {
    fn create_account(&self, input: CreateAccount)
    -> impl Future<Output = WardenResult<Account>> + Send;

    /// Returns [`WardenError::NotFound`] for unknown ids.
    fn find_account_by_id(&self, id: Uuid) -> impl Future<Output = WardenResult<Account>> + Send;

    /// Atomically increment the account's token version and return the
    /// new value.
    fn increment_token_version(&self, id: Uuid) -> impl Future<Output = WardenResult<u64>> + Send;

    fn set_active(&self, id: Uuid, active: bool) -> impl Future<Output = WardenResult<()>> + Send;
}
