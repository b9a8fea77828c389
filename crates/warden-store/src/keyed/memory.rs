//! In-memory keyed store for development, single-instance deployments
//! and tests.
//!
//! A single lock guards the whole map, so every trait method is atomic
//! with respect to every other. Expiry is lazy and driven by the injected
//! [`Clock`], which lets tests move time forward.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::debug;
use warden_core::clock::{Clock, SystemClock};
use warden_core::error::WardenResult;
use warden_core::store::KeyedStore;

use super::ttl_millis;
use crate::error::StoreError;

#[derive(Debug, Clone)]
enum Slot {
    Str(String),
    /// (score, member); members are unique.
    SortedSet(Vec<(i64, String)>),
    Set(HashSet<String>),
    Hash(HashMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    slot: Slot,
    expires_at_ms: i64,
}

#[derive(Clone)]
pub struct MemoryKeyedStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    clock: Arc<dyn Clock>,
    unavailable: Arc<AtomicBool>,
}

impl Default for MemoryKeyedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKeyedStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Simulate an outage: while set, every operation fails.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Drop every expired key.
    pub async fn cleanup(&self) -> usize {
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at_ms > now);
        let removed = before - entries.len();
        debug!(removed, "Completed keyed store cleanup");
        removed
    }

    /// Remaining TTL of a live key.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|e| e.expires_at_ms > now)
            .map(|e| Duration::from_millis((e.expires_at_ms - now) as u64))
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }

    fn expiry(&self, ttl: Duration) -> i64 {
        self.clock.now_millis().saturating_add(ttl_millis(ttl))
    }
}

/// Fetch a live entry, evicting it first if it has expired.
fn live<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
    now: i64,
) -> Option<&'a mut Entry> {
    if entries.get(key).is_some_and(|e| e.expires_at_ms <= now) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::WrongType {
        key: key.to_string(),
    }
}

impl KeyedStore for MemoryKeyedStore {
    async fn get(&self, key: &str) -> WardenResult<Option<String>> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => Ok(None),
            Some(Entry {
                slot: Slot::Str(s), ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(wrong_type(key).into()),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> WardenResult<()> {
        self.check_available()?;
        let expires_at_ms = self.expiry(ttl);
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                slot: Slot::Str(value.to_string()),
                expires_at_ms,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> WardenResult<bool> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        Ok(entries
            .remove(key)
            .is_some_and(|e| e.expires_at_ms > now))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> WardenResult<bool> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at_ms = expires_at_ms;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> WardenResult<i64> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.entries.lock().await;
        let current = match live(&mut entries, key, now) {
            None => 0,
            Some(Entry {
                slot: Slot::Str(s), ..
            }) => s
                .parse::<i64>()
                .map_err(|_| StoreError::Corrupt(format!("{key} is not an integer")))?,
            Some(_) => return Err(wrong_type(key).into()),
        };
        let next = current.saturating_add(delta);
        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::Str(next.to_string()),
                expires_at_ms,
            },
        );
        Ok(next)
    }

    async fn window_hit(
        &self,
        key: &str,
        now_ms: i64,
        window: Duration,
        member: &str,
    ) -> WardenResult<u64> {
        self.check_available()?;
        let cutoff = now_ms - ttl_millis(window);
        let expires_at_ms = now_ms.saturating_add(ttl_millis(window));
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;

        let mut items = match live(&mut entries, key, now) {
            None => Vec::new(),
            Some(Entry {
                slot: Slot::SortedSet(items),
                ..
            }) => std::mem::take(items),
            Some(_) => return Err(wrong_type(key).into()),
        };
        items.retain(|(score, m)| *score > cutoff && m != member);
        items.push((now_ms, member.to_string()));
        let count = items.len() as u64;

        entries.insert(
            key.to_string(),
            Entry {
                slot: Slot::SortedSet(items),
                expires_at_ms,
            },
        );
        Ok(count)
    }

    async fn window_count(&self, key: &str, now_ms: i64, window: Duration) -> WardenResult<u64> {
        self.check_available()?;
        let cutoff = now_ms - ttl_millis(window);
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => Ok(0),
            Some(Entry {
                slot: Slot::SortedSet(items),
                ..
            }) => {
                items.retain(|(score, _)| *score > cutoff);
                Ok(items.len() as u64)
            }
            Some(_) => Err(wrong_type(key).into()),
        }
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> WardenResult<()> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::Set(HashSet::from([member.to_string()])),
                        expires_at_ms,
                    },
                );
            }
            Some(Entry {
                slot: Slot::Set(members),
                expires_at_ms: expiry,
            }) => {
                members.insert(member.to_string());
                *expiry = expires_at_ms;
            }
            Some(_) => return Err(wrong_type(key).into()),
        }
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> WardenResult<()> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => Ok(()),
            Some(Entry {
                slot: Slot::Set(members),
                ..
            }) => {
                members.remove(member);
                if members.is_empty() {
                    entries.remove(key);
                }
                Ok(())
            }
            Some(_) => Err(wrong_type(key).into()),
        }
    }

    async fn set_members(&self, key: &str) -> WardenResult<Vec<String>> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => Ok(Vec::new()),
            Some(Entry {
                slot: Slot::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key).into()),
        }
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str, ttl: Duration) -> WardenResult<()> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let expires_at_ms = self.expiry(ttl);
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        slot: Slot::Hash(HashMap::from([(field.to_string(), value.to_string())])),
                        expires_at_ms,
                    },
                );
            }
            Some(Entry {
                slot: Slot::Hash(map),
                expires_at_ms: expiry,
            }) => {
                map.insert(field.to_string(), value.to_string());
                *expiry = expires_at_ms;
            }
            Some(_) => return Err(wrong_type(key).into()),
        }
        Ok(())
    }

    async fn hash_get(&self, key: &str, field: &str) -> WardenResult<Option<String>> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => Ok(None),
            Some(Entry {
                slot: Slot::Hash(map),
                ..
            }) => Ok(map.get(field).cloned()),
            Some(_) => Err(wrong_type(key).into()),
        }
    }

    async fn hash_get_all(&self, key: &str) -> WardenResult<HashMap<String, String>> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => Ok(HashMap::new()),
            Some(Entry {
                slot: Slot::Hash(map),
                ..
            }) => Ok(map.clone()),
            Some(_) => Err(wrong_type(key).into()),
        }
    }

    async fn hash_delete(&self, key: &str, field: &str) -> WardenResult<()> {
        self.check_available()?;
        let now = self.clock.now_millis();
        let mut entries = self.entries.lock().await;
        match live(&mut entries, key, now) {
            None => Ok(()),
            Some(Entry {
                slot: Slot::Hash(map),
                ..
            }) => {
                map.remove(field);
                if map.is_empty() {
                    entries.remove(key);
                }
                Ok(())
            }
            Some(_) => Err(wrong_type(key).into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::clock::ManualClock;
    use warden_core::error::WardenError;

    fn store() -> (MemoryKeyedStore, ManualClock) {
        let clock = ManualClock::starting_now();
        (MemoryKeyedStore::with_clock(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn values_expire_with_the_clock() {
        let (store, clock) = store();
        store
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));

        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_by_starts_from_zero_and_goes_negative() {
        let (store, _) = store();
        let ttl = Duration::from_secs(60);
        assert_eq!(store.incr_by("rep", -10, ttl).await.unwrap(), -10);
        assert_eq!(store.incr_by("rep", -10, ttl).await.unwrap(), -20);
        assert_eq!(store.incr_by("rep", 5, ttl).await.unwrap(), -15);
    }

    #[tokio::test]
    async fn window_prunes_old_entries() {
        let (store, clock) = store();
        let window = Duration::from_secs(10);
        let t0 = clock.now_millis();

        assert_eq!(store.window_hit("w", t0, window, "a").await.unwrap(), 1);
        assert_eq!(
            store.window_hit("w", t0 + 5_000, window, "b").await.unwrap(),
            2
        );

        clock.advance(chrono::Duration::seconds(10));
        let now = clock.now_millis();
        // "a" sits exactly on the cutoff and is dropped; "b" survives.
        assert_eq!(store.window_count("w", now, window).await.unwrap(), 1);
        assert_eq!(store.window_hit("w", now, window, "c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn sets_and_hashes() {
        let (store, _) = store();
        let ttl = Duration::from_secs(60);
        store.set_add("s", "x", ttl).await.unwrap();
        store.set_add("s", "y", ttl).await.unwrap();
        store.set_add("s", "x", ttl).await.unwrap();
        let mut members = store.set_members("s").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["x", "y"]);
        store.set_remove("s", "x").await.unwrap();
        assert_eq!(store.set_members("s").await.unwrap(), vec!["y"]);

        store.hash_set("h", "f1", "v1", ttl).await.unwrap();
        store.hash_set("h", "f2", "v2", ttl).await.unwrap();
        assert_eq!(
            store.hash_get("h", "f1").await.unwrap().as_deref(),
            Some("v1")
        );
        assert_eq!(store.hash_get_all("h").await.unwrap().len(), 2);
        store.hash_delete("h", "f1").await.unwrap();
        assert_eq!(store.hash_get("h", "f1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_type_is_a_store_error() {
        let (store, _) = store();
        store
            .set("k", "v", Duration::from_secs(60))
            .await
            .unwrap();
        let err = store
            .set_add("k", "m", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, WardenError::Store(_)));
    }

    #[tokio::test]
    async fn outage_fails_every_operation() {
        let (store, _) = store();
        store.set_unavailable(true);
        assert!(store.get("k").await.is_err());
        store.set_unavailable(false);
        assert!(store.get("k").await.is_ok());
    }

    #[tokio::test]
    async fn cleanup_drops_expired_keys() {
        let (store, clock) = store();
        store.set("a", "1", Duration::from_secs(1)).await.unwrap();
        store.set("b", "2", Duration::from_secs(100)).await.unwrap();
        clock.advance(chrono::Duration::seconds(2));
        assert_eq!(store.cleanup().await, 1);
        assert!(store.ttl("b").await.is_some());
    }
}
