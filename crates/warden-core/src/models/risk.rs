//! Anomaly scoring results.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The independent signals the detector scores.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RiskFactorKind {
    NewDevice,
    NewIpAddress,
    SuspiciousIp,
    BotUserAgent,
    RapidDeviceSwitching,
    NewTimezone,
}

impl RiskFactorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewDevice => "new_device",
            Self::NewIpAddress => "new_ip_address",
            Self::SuspiciousIp => "suspicious_ip",
            Self::BotUserAgent => "bot_user_agent",
            Self::RapidDeviceSwitching => "rapid_device_switching",
            Self::NewTimezone => "new_timezone",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskFactor {
    pub kind: RiskFactorKind,
    pub weight: u32,
    /// Human-readable explanation for the audit trail.
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RiskAssessment {
    pub is_suspicious: bool,
    pub score: u32,
    pub risk_level: RiskLevel,
    pub factors: Vec<RiskFactor>,
    pub is_new_device: bool,
    /// Whether the critical-risk response (mass invalidation) ran.
    pub sessions_invalidated: bool,
    /// Set when scoring could not consult the store.
    pub fault: Option<String>,
}

impl RiskAssessment {
    pub fn has_factor(&self, kind: RiskFactorKind) -> bool {
        self.factors.iter().any(|f| f.kind == kind)
    }

    /// High or critical risk: the caller should demand extra verification.
    pub fn requires_verification(&self) -> bool {
        self.risk_level >= RiskLevel::High
    }

    /// Neutral assessment used when the history could not be read.
    pub fn unavailable(fault: String) -> Self {
        Self {
            is_suspicious: false,
            score: 0,
            risk_level: RiskLevel::Low,
            factors: Vec::new(),
            is_new_device: false,
            sessions_invalidated: false,
            fault: Some(fault),
        }
    }
}
