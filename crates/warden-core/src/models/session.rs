//! Session domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::risk::RiskLevel;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationReason {
    Logout,
    TokenVersionBump,
    CriticalAnomaly,
    PasswordChange,
    Administrative,
    SecurityIncident,
    /// The session was minted while a mass invalidation was in flight.
    ConcurrentRevocation,
}

impl InvalidationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::TokenVersionBump => "token_version_bump",
            Self::CriticalAnomaly => "critical_anomaly",
            Self::PasswordChange => "password_change",
            Self::Administrative => "administrative",
            Self::SecurityIncident => "security_incident",
            Self::ConcurrentRevocation => "concurrent_revocation",
        }
    }
}

impl std::fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRisk {
    pub suspicion_score: u32,
    pub risk_level: RiskLevel,
}

/// Server-side session state. The keyed store is its single source of
/// truth; only the session manager writes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub account_id: Uuid,
    pub role: String,
    pub device_fingerprint: String,
    pub network_fingerprint: String,
    /// Only ever increases.
    pub token_version: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub active: bool,
    pub risk: SessionRisk,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub invalidation_reason: Option<InvalidationReason>,
}

/// Per-account result of a mass invalidation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InvalidationSummary {
    pub account_id: Uuid,
    pub sessions_found: usize,
    pub sessions_invalidated: usize,
    pub token_versions_bumped: usize,
    /// The account-level token version after the bump, if one happened.
    pub account_token_version: Option<u64>,
    pub failures: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkInvalidationItem {
    pub account_id: Uuid,
    pub summary: Option<InvalidationSummary>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkInvalidationResult {
    pub items: Vec<BulkInvalidationItem>,
    pub accounts_succeeded: usize,
    pub accounts_failed: usize,
    pub total_sessions_invalidated: usize,
    /// True only when every account succeeded.
    pub success: bool,
}
