//! IP reputation and block records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reason recorded when reputation decay triggers an automatic block.
pub const REPUTATION_THRESHOLD_EXCEEDED: &str = "reputation_threshold_exceeded";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpBlockRecord {
    pub ip: String,
    /// Escalates across repeated offenses while a block is active.
    pub level: u32,
    pub reason: String,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpBlockStatus {
    pub blocked: bool,
    pub record: Option<IpBlockRecord>,
    pub retry_after_secs: Option<u64>,
    /// Set when the lookup failed open.
    pub fault: Option<String>,
}

impl IpBlockStatus {
    pub fn clear() -> Self {
        Self {
            blocked: false,
            record: None,
            retry_after_secs: None,
            fault: None,
        }
    }
}
