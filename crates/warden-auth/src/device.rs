//! Device fingerprinting and per-account device history.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::clock::Clock;
use warden_core::error::WardenResult;
use warden_core::models::device::{DeviceProfile, DeviceRecord, RequestMeta};
use warden_core::store::{KeyedStore, StoreConfig, bounded};

use crate::config::AnomalyConfig;

/// Hash a list of signals. Missing signals hash as empty strings so the
/// position of each signal is fixed.
fn digest(signals: &[Option<&str>]) -> String {
    let mut hasher = Sha256::new();
    for signal in signals {
        hasher.update(signal.unwrap_or("").trim().as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

/// Derive the device and network fingerprints for a request.
pub fn create_device_profile(meta: &RequestMeta, now: DateTime<Utc>) -> DeviceProfile {
    let fingerprint = digest(&[
        meta.user_agent.as_deref(),
        meta.accept.as_deref(),
        meta.accept_language.as_deref(),
        meta.accept_encoding.as_deref(),
        meta.timezone.as_deref(),
        meta.screen_resolution.as_deref(),
        meta.color_depth.as_deref(),
        meta.platform.as_deref(),
    ]);
    let network_fingerprint = digest(&[
        meta.ip_address.as_deref(),
        meta.forwarded_for.as_deref(),
        meta.connection.as_deref(),
        meta.sec_fetch_site.as_deref(),
        meta.sec_fetch_mode.as_deref(),
    ]);

    DeviceProfile {
        fingerprint,
        network_fingerprint,
        ip_address: meta.ip_address.clone(),
        user_agent: meta.user_agent.clone(),
        timezone: meta.timezone.clone(),
        created_at: now,
    }
}

/// Bounds on what the tracker keeps per account.
#[derive(Debug, Clone, Copy)]
pub struct DeviceHistoryLimits {
    /// Devices kept, most recently seen first.
    pub devices: usize,
    /// Session ids kept on one device record, newest last.
    pub sessions_per_device: usize,
    /// Known IPs and known timezones kept, most recently seen first.
    pub known_values: usize,
    /// Lifetime of every entry after its last sighting.
    pub ttl: Duration,
}

impl From<&AnomalyConfig> for DeviceHistoryLimits {
    fn from(config: &AnomalyConfig) -> Self {
        Self {
            devices: config.device_history_limit,
            sessions_per_device: config.device_session_limit,
            known_values: config.known_value_limit,
            ttl: Duration::from_secs(config.device_history_ttl_secs),
        }
    }
}

/// Rolling per-account device history plus the IPs and timezones an
/// account has recently been seen from.
///
/// Known IPs and timezones are hashes of value to last-seen millis, so
/// they can be trimmed by age and count like the device history.
#[derive(Clone)]
pub struct DeviceTracker<S> {
    store: S,
    keys: StoreConfig,
    clock: Arc<dyn Clock>,
    limits: DeviceHistoryLimits,
}

impl<S: KeyedStore> DeviceTracker<S> {
    pub fn new(
        store: S,
        keys: StoreConfig,
        clock: Arc<dyn Clock>,
        limits: DeviceHistoryLimits,
    ) -> Self {
        Self {
            store,
            keys,
            clock,
            limits,
        }
    }

    fn devices_key(&self, account_id: Uuid) -> String {
        self.keys.key(&["devices", &account_id.to_string()])
    }

    fn known_ips_key(&self, account_id: Uuid) -> String {
        self.keys.key(&["known_ips", &account_id.to_string()])
    }

    fn known_timezones_key(&self, account_id: Uuid) -> String {
        self.keys.key(&["known_tz", &account_id.to_string()])
    }

    /// Upsert the device a session was created on and remember its IP
    /// and timezone.
    pub async fn track_device_session(
        &self,
        account_id: Uuid,
        session_id: Uuid,
        profile: &DeviceProfile,
    ) -> WardenResult<DeviceRecord> {
        let now = self.clock.now();
        let key = self.devices_key(account_id);
        let timeout = self.keys.timeout();

        let existing = bounded(
            timeout,
            "hash_get",
            self.store.hash_get(&key, &profile.fingerprint),
        )
        .await?;
        let record = match existing.map(|raw| serde_json::from_str::<DeviceRecord>(&raw)) {
            Some(Ok(mut record)) => {
                record.last_seen = now;
                record.session_count += 1;
                record.network_fingerprint = profile.network_fingerprint.clone();
                record.last_ip = profile.ip_address.clone().or(record.last_ip);
                record.user_agent = profile.user_agent.clone().or(record.user_agent);
                record.timezone = profile.timezone.clone().or(record.timezone);
                if !record.active_sessions.contains(&session_id) {
                    record.active_sessions.push(session_id);
                }
                // Sessions that ended by expiry are never detached.
                let excess = record
                    .active_sessions
                    .len()
                    .saturating_sub(self.limits.sessions_per_device);
                record.active_sessions.drain(..excess);
                record
            }
            other => {
                if let Some(Err(e)) = other {
                    warn!(account_id = %account_id, error = %e, "Replacing unreadable device record");
                }
                DeviceRecord {
                    fingerprint: profile.fingerprint.clone(),
                    network_fingerprint: profile.network_fingerprint.clone(),
                    first_seen: now,
                    last_seen: now,
                    session_count: 1,
                    last_ip: profile.ip_address.clone(),
                    user_agent: profile.user_agent.clone(),
                    timezone: profile.timezone.clone(),
                    active_sessions: vec![session_id],
                }
            }
        };

        let payload = serde_json::to_string(&record)?;
        bounded(
            timeout,
            "hash_set",
            self.store
                .hash_set(&key, &record.fingerprint, &payload, self.limits.ttl),
        )
        .await?;

        if let Some(ip) = profile.ip_address.as_deref() {
            self.remember(&self.known_ips_key(account_id), ip, now).await?;
        }
        if let Some(tz) = profile.timezone.as_deref() {
            self.remember(&self.known_timezones_key(account_id), tz, now)
                .await?;
        }

        self.enforce_limit(account_id).await?;
        debug!(
            account_id = %account_id,
            session_id = %session_id,
            session_count = record.session_count,
            "Tracked device session"
        );
        Ok(record)
    }

    /// Evict the least recently seen devices beyond the history limit.
    async fn enforce_limit(&self, account_id: Uuid) -> WardenResult<()> {
        let history = self.history(account_id).await?;
        if history.len() <= self.limits.devices {
            return Ok(());
        }
        let key = self.devices_key(account_id);
        for record in &history[self.limits.devices..] {
            bounded(
                self.keys.timeout(),
                "hash_delete",
                self.store.hash_delete(&key, &record.fingerprint),
            )
            .await?;
        }
        Ok(())
    }

    /// All tracked devices, most recently seen first.
    pub async fn history(&self, account_id: Uuid) -> WardenResult<Vec<DeviceRecord>> {
        let raw = bounded(
            self.keys.timeout(),
            "hash_get_all",
            self.store.hash_get_all(&self.devices_key(account_id)),
        )
        .await?;
        let mut records: Vec<DeviceRecord> = raw
            .values()
            .filter_map(|value| serde_json::from_str(value).ok())
            .collect();
        records.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        Ok(records)
    }

    pub async fn history_map(&self, account_id: Uuid) -> WardenResult<HashMap<String, DeviceRecord>> {
        Ok(self
            .history(account_id)
            .await?
            .into_iter()
            .map(|r| (r.fingerprint.clone(), r))
            .collect())
    }

    /// Record a sighting of `value`, then drop entries past the TTL and
    /// all but the most recent `known_values`.
    async fn remember(&self, key: &str, value: &str, now: DateTime<Utc>) -> WardenResult<()> {
        let timeout = self.keys.timeout();
        bounded(
            timeout,
            "hash_set",
            self.store.hash_set(
                key,
                value,
                &now.timestamp_millis().to_string(),
                self.limits.ttl,
            ),
        )
        .await?;

        let seen = bounded(timeout, "hash_get_all", self.store.hash_get_all(key)).await?;
        let cutoff = self.cutoff_millis(now);
        let mut entries: Vec<(i64, String)> = seen
            .into_iter()
            .map(|(value, at)| (at.parse().unwrap_or(i64::MIN), value))
            .collect();
        entries.sort_by(|a, b| b.0.cmp(&a.0));

        for (rank, (at, value)) in entries.iter().enumerate() {
            if rank >= self.limits.known_values || *at <= cutoff {
                bounded(timeout, "hash_delete", self.store.hash_delete(key, value)).await?;
            }
        }
        Ok(())
    }

    fn cutoff_millis(&self, now: DateTime<Utc>) -> i64 {
        let ttl = i64::try_from(self.limits.ttl.as_millis()).unwrap_or(i64::MAX);
        now.timestamp_millis().saturating_sub(ttl)
    }

    async fn recent_values(&self, key: &str) -> WardenResult<HashSet<String>> {
        let seen = bounded(
            self.keys.timeout(),
            "hash_get_all",
            self.store.hash_get_all(key),
        )
        .await?;
        let cutoff = self.cutoff_millis(self.clock.now());
        Ok(seen
            .into_iter()
            .filter(|(_, at)| at.parse::<i64>().is_ok_and(|at| at > cutoff))
            .map(|(value, _)| value)
            .collect())
    }

    pub async fn known_ips(&self, account_id: Uuid) -> WardenResult<HashSet<String>> {
        self.recent_values(&self.known_ips_key(account_id)).await
    }

    pub async fn known_timezones(&self, account_id: Uuid) -> WardenResult<HashSet<String>> {
        self.recent_values(&self.known_timezones_key(account_id)).await
    }

    /// Detach a session from its device. Returns whether the session was
    /// attached.
    pub async fn invalidate_device_session(
        &self,
        account_id: Uuid,
        fingerprint: &str,
        session_id: Uuid,
    ) -> WardenResult<bool> {
        let key = self.devices_key(account_id);
        let raw = bounded(
            self.keys.timeout(),
            "hash_get",
            self.store.hash_get(&key, fingerprint),
        )
        .await?;
        let Some(raw) = raw else {
            return Ok(false);
        };
        let mut record: DeviceRecord = serde_json::from_str(&raw)?;
        let before = record.active_sessions.len();
        record.active_sessions.retain(|id| *id != session_id);
        if record.active_sessions.len() == before {
            return Ok(false);
        }

        let payload = serde_json::to_string(&record)?;
        bounded(
            self.keys.timeout(),
            "hash_set",
            self.store.hash_set(&key, fingerprint, &payload, self.limits.ttl),
        )
        .await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use warden_core::clock::ManualClock;
    use warden_store::MemoryKeyedStore;

    use super::*;

    fn tracker(clock: &ManualClock, limits: DeviceHistoryLimits) -> DeviceTracker<MemoryKeyedStore> {
        DeviceTracker::new(
            MemoryKeyedStore::with_clock(Arc::new(clock.clone())),
            StoreConfig::default(),
            Arc::new(clock.clone()),
            limits,
        )
    }

    fn small_limits() -> DeviceHistoryLimits {
        DeviceHistoryLimits {
            devices: 5,
            sessions_per_device: 3,
            known_values: 3,
            ttl: Duration::from_secs(10 * 24 * 60 * 60),
        }
    }

    fn meta() -> RequestMeta {
        RequestMeta {
            ip_address: Some("10.0.0.1".into()),
            user_agent: Some("Mozilla/5.0 (X11; Linux x86_64) Firefox/128.0".into()),
            accept_language: Some("en-US".into()),
            timezone: Some("Europe/Berlin".into()),
            screen_resolution: Some("1920x1080".into()),
            ..Default::default()
        }
    }

    #[test]
    fn fingerprint_is_stable_across_networks() {
        let now = Utc::now();
        let home = create_device_profile(&meta(), now);
        let cafe = create_device_profile(
            &RequestMeta {
                ip_address: Some("192.0.2.55".into()),
                ..meta()
            },
            now,
        );
        assert_eq!(home.fingerprint, cafe.fingerprint);
        assert_ne!(home.network_fingerprint, cafe.network_fingerprint);
    }

    #[test]
    fn client_signals_change_the_fingerprint() {
        let now = Utc::now();
        let a = create_device_profile(&meta(), now);
        let b = create_device_profile(
            &RequestMeta {
                timezone: Some("America/New_York".into()),
                ..meta()
            },
            now,
        );
        assert_ne!(a.fingerprint, b.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn signal_positions_are_fixed() {
        let now = Utc::now();
        let a = create_device_profile(
            &RequestMeta {
                accept: Some("x".into()),
                ..Default::default()
            },
            now,
        );
        let b = create_device_profile(
            &RequestMeta {
                accept_language: Some("x".into()),
                ..Default::default()
            },
            now,
        );
        assert_ne!(a.fingerprint, b.fingerprint);
    }

    #[tokio::test]
    async fn session_ids_per_device_are_capped() {
        let clock = ManualClock::starting_now();
        let devices = tracker(&clock, small_limits());
        let account = Uuid::new_v4();
        let sessions: Vec<Uuid> = (0..5).map(|_| Uuid::new_v4()).collect();

        for session in &sessions {
            let profile = create_device_profile(&meta(), clock.now());
            devices
                .track_device_session(account, *session, &profile)
                .await
                .unwrap();
            clock.advance(chrono::Duration::days(8));
        }

        let history = devices.history(account).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].session_count, 5);
        assert_eq!(history[0].active_sessions, sessions[2..].to_vec());
    }

    #[tokio::test]
    async fn known_ips_keep_only_the_most_recent() {
        let clock = ManualClock::starting_now();
        let devices = tracker(&clock, small_limits());
        let account = Uuid::new_v4();

        for last_octet in 1..=5 {
            let profile = create_device_profile(
                &RequestMeta {
                    ip_address: Some(format!("10.0.0.{last_octet}")),
                    ..meta()
                },
                clock.now(),
            );
            devices
                .track_device_session(account, Uuid::new_v4(), &profile)
                .await
                .unwrap();
            clock.advance(chrono::Duration::seconds(1));
        }

        let known = devices.known_ips(account).await.unwrap();
        let expected: HashSet<String> = ["10.0.0.3", "10.0.0.4", "10.0.0.5"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(known, expected);
        assert_eq!(devices.known_timezones(account).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn known_ips_age_out_while_account_stays_active() {
        let clock = ManualClock::starting_now();
        let devices = tracker(&clock, small_limits());
        let account = Uuid::new_v4();
        let login = |ip: &str| RequestMeta {
            ip_address: Some(ip.into()),
            ..meta()
        };

        let first = create_device_profile(&login("10.0.0.1"), clock.now());
        devices
            .track_device_session(account, Uuid::new_v4(), &first)
            .await
            .unwrap();
        clock.advance(chrono::Duration::days(6));
        let second = create_device_profile(&login("10.0.0.2"), clock.now());
        devices
            .track_device_session(account, Uuid::new_v4(), &second)
            .await
            .unwrap();
        clock.advance(chrono::Duration::days(6));

        let known = devices.known_ips(account).await.unwrap();
        assert!(!known.contains("10.0.0.1"));
        assert!(known.contains("10.0.0.2"));
    }
}
