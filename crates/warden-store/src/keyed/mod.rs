//! [`KeyedStore`](warden_core::store::KeyedStore) implementations.

mod memory;
mod redis_store;

pub use memory::MemoryKeyedStore;
pub use redis_store::RedisKeyedStore;

use std::time::Duration;

/// Millisecond TTL as Redis expects it; never zero.
pub(crate) fn ttl_millis(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX).max(1)
}
