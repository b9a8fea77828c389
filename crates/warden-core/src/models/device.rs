//! Device profile and per-account device history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-declared request metadata the fingerprinter reads.
///
/// Header transport is the caller's concern; it copies whatever it has
/// into this struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub accept: Option<String>,
    pub accept_language: Option<String>,
    pub accept_encoding: Option<String>,
    pub timezone: Option<String>,
    pub screen_resolution: Option<String>,
    pub color_depth: Option<String>,
    pub platform: Option<String>,
    pub connection: Option<String>,
    pub sec_fetch_site: Option<String>,
    pub sec_fetch_mode: Option<String>,
    pub forwarded_for: Option<String>,
}

/// Derived from a single request; never stored on its own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceProfile {
    /// SHA-256 over stable client signals.
    pub fingerprint: String,
    /// SHA-256 over IP and connection signals.
    pub network_fingerprint: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timezone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One entry of an account's rolling device history, keyed by
/// fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceRecord {
    pub fingerprint: String,
    pub network_fingerprint: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub session_count: u64,
    pub last_ip: Option<String>,
    pub user_agent: Option<String>,
    pub timezone: Option<String>,
    /// Most recent sessions bound to this device. Capped, so ids of
    /// sessions that simply expired eventually fall off.
    #[serde(default)]
    pub active_sessions: Vec<Uuid>,
}
