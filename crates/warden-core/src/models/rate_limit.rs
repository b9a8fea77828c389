//! Rate-limit types.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WardenError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LimitType {
    /// General API traffic.
    Api,
    /// Login / token issuance attempts.
    Auth,
    PasswordReset,
    Registration,
}

impl LimitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Auth => "auth",
            Self::PasswordReset => "password_reset",
            Self::Registration => "registration",
        }
    }
}

/// Operator-set tightening of limits during an incident.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum ThreatLevel {
    #[default]
    None,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl FromStr for ThreatLevel {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(WardenError::validation(format!(
                "invalid threat level: {other}"
            ))),
        }
    }
}

/// Result of one sliding-window check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitOutcome {
    pub allowed: bool,
    /// Entries in the window, including this request.
    pub count: u64,
    pub remaining: u64,
    pub blocked: bool,
    /// Effective maximum after the threat-level multiplier.
    pub limit: u64,
    pub reset_at: DateTime<Utc>,
    pub retry_after_secs: Option<u64>,
    /// Set when the decision failed open.
    pub fault: Option<String>,
}

/// Active emergency override of rate-limit enforcement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmergencyOverride {
    pub enforcement_disabled: bool,
    pub reason: String,
    pub operator: String,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threat_level_parses_case_insensitively() {
        assert_eq!("HIGH".parse::<ThreatLevel>().unwrap(), ThreatLevel::High);
        assert_eq!(" none ".parse::<ThreatLevel>().unwrap(), ThreatLevel::None);
    }

    #[test]
    fn unknown_threat_level_is_a_validation_error() {
        let err = "severe".parse::<ThreatLevel>().unwrap_err();
        assert!(matches!(err, WardenError::Validation { .. }));
    }
}
