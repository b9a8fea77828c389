//! Security event model. Events are write-once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    SessionCreated,
    SessionInvalidated,
    AllSessionsInvalidated,
    TokenRejected,
    TokenBlacklisted,
    DeviceMismatch,
    SuspiciousActivity,
    CriticalAnomaly,
    RateLimitExceeded,
    IpBlocked,
    IpUnblocked,
    ReputationDegraded,
    ThreatLevelChanged,
    EmergencyOverride,
    StoreFault,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::SessionInvalidated => "session_invalidated",
            Self::AllSessionsInvalidated => "all_sessions_invalidated",
            Self::TokenRejected => "token_rejected",
            Self::TokenBlacklisted => "token_blacklisted",
            Self::DeviceMismatch => "device_mismatch",
            Self::SuspiciousActivity => "suspicious_activity",
            Self::CriticalAnomaly => "critical_anomaly",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::IpBlocked => "ip_blocked",
            Self::IpUnblocked => "ip_unblocked",
            Self::ReputationDegraded => "reputation_degraded",
            Self::ThreatLevelChanged => "threat_level_changed",
            Self::EmergencyOverride => "emergency_override",
            Self::StoreFault => "store_fault",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityEvent {
    pub correlation_id: Uuid,
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub account_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub device_fingerprint: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// An event before it is stamped with a correlation id and timestamp.
#[derive(Debug, Clone)]
pub struct NewSecurityEvent {
    pub event_type: SecurityEventType,
    pub severity: Severity,
    pub account_id: Option<Uuid>,
    pub ip_address: Option<String>,
    pub device_fingerprint: Option<String>,
    pub details: serde_json::Value,
}

impl NewSecurityEvent {
    pub fn new(event_type: SecurityEventType, severity: Severity) -> Self {
        Self {
            event_type,
            severity,
            account_id: None,
            ip_address: None,
            device_fingerprint: None,
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn account(mut self, account_id: Uuid) -> Self {
        self.account_id = Some(account_id);
        self
    }

    pub fn ip(mut self, ip: Option<impl Into<String>>) -> Self {
        self.ip_address = ip.map(Into::into);
        self
    }

    pub fn device(mut self, fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
