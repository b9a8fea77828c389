//! Rate limiting and IP reputation configuration.

use std::time::Duration;

use serde::Deserialize;
use warden_core::models::rate_limit::{LimitType, ThreatLevel};

/// A sliding window: at most `max_requests` within `window_secs`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct WindowConfig {
    pub window_secs: u64,
    pub max_requests: u64,
}

impl WindowConfig {
    pub const fn new(window_secs: u64, max_requests: u64) -> Self {
        Self {
            window_secs,
            max_requests,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

/// Default window per limit type.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// General API traffic (default: 100 per 15 minutes).
    pub api: WindowConfig,
    /// Login attempts (default: 10 per 15 minutes).
    pub auth: WindowConfig,
    /// Password reset requests (default: 3 per hour).
    pub password_reset: WindowConfig,
    /// Account registrations (default: 5 per hour).
    pub registration: WindowConfig,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            api: WindowConfig::new(15 * 60, 100),
            auth: WindowConfig::new(15 * 60, 10),
            password_reset: WindowConfig::new(60 * 60, 3),
            registration: WindowConfig::new(60 * 60, 5),
        }
    }
}

impl LimitsConfig {
    pub fn for_type(&self, limit_type: LimitType) -> WindowConfig {
        match limit_type {
            LimitType::Api => self.api,
            LimitType::Auth => self.auth,
            LimitType::PasswordReset => self.password_reset,
            LimitType::Registration => self.registration,
        }
    }
}

/// Progressive delay and reputation decay.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Delay for the first attempt (default: 1000 ms).
    pub base_delay_ms: u64,
    /// Upper bound for any delay (default: 30 000 ms).
    pub max_delay_ms: u64,
    /// Reputation subtracted per delayed attempt (default: 10).
    pub reputation_penalty: i64,
    /// Reputation at or below which the IP is blocked (default: -50).
    pub critical_reputation: i64,
    /// Lifetime of a reputation score since its last change
    /// (default: 24 hours).
    pub reputation_ttl_secs: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            reputation_penalty: 10,
            critical_reputation: -50,
            reputation_ttl_secs: 24 * 60 * 60,
        }
    }
}

/// Exponential-backoff IP blocking.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// Duration of a first-offense block (default: 15 minutes).
    pub base_duration_secs: u64,
    /// Ceiling for any block (default: 24 hours).
    pub max_duration_secs: u64,
    /// Escalate repeated blocks (default: true).
    pub backoff: bool,
}

impl Default for BlockConfig {
    fn default() -> Self {
        Self {
            base_duration_secs: 15 * 60,
            max_duration_secs: 24 * 60 * 60,
            backoff: true,
        }
    }
}

/// Multipliers applied to a window's maximum while a threat level is
/// active.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThreatMultipliers {
    pub none: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for ThreatMultipliers {
    fn default() -> Self {
        Self {
            none: 1.0,
            medium: 0.5,
            high: 0.25,
            critical: 0.1,
        }
    }
}

impl ThreatMultipliers {
    pub fn for_level(&self, level: ThreatLevel) -> f64 {
        match level {
            ThreatLevel::None => self.none,
            ThreatLevel::Medium => self.medium,
            ThreatLevel::High => self.high,
            ThreatLevel::Critical => self.critical,
        }
    }
}

/// Rate limiter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub limits: LimitsConfig,
    pub delay: DelayConfig,
    pub block: BlockConfig,
    pub threat_multipliers: ThreatMultipliers,
    /// Longest an emergency override may stay active (default: 1 hour).
    pub max_override_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limits: LimitsConfig::default(),
            delay: DelayConfig::default(),
            block: BlockConfig::default(),
            threat_multipliers: ThreatMultipliers::default(),
            max_override_secs: 60 * 60,
        }
    }
}

impl RateLimitConfig {
    /// Reject configurations the limiter cannot enforce.
    pub fn validate(&self) -> Result<(), String> {
        for (name, window) in [
            ("api", self.limits.api),
            ("auth", self.limits.auth),
            ("password_reset", self.limits.password_reset),
            ("registration", self.limits.registration),
        ] {
            if window.window_secs == 0 || window.max_requests == 0 {
                return Err(format!("rate limit {name} must have a non-zero window and max"));
            }
        }
        let m = &self.threat_multipliers;
        for (name, value) in [
            ("none", m.none),
            ("medium", m.medium),
            ("high", m.high),
            ("critical", m.critical),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(format!("threat multiplier {name} must be in (0, 1]"));
            }
        }
        if self.delay.base_delay_ms > self.delay.max_delay_ms {
            return Err("base delay exceeds max delay".into());
        }
        if self.block.base_duration_secs == 0
            || self.block.base_duration_secs > self.block.max_duration_secs
        {
            return Err("block base duration must be non-zero and within the cap".into());
        }
        if self.delay.critical_reputation >= 0 {
            return Err("critical reputation must be negative".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = RateLimitConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.limits.for_type(LimitType::Auth).max_requests, 10);
        assert_eq!(config.threat_multipliers.for_level(ThreatLevel::Critical), 0.1);
    }

    #[test]
    fn out_of_range_multiplier_is_rejected() {
        let mut config = RateLimitConfig::default();
        config.threat_multipliers.high = 1.5;
        assert!(config.validate().is_err());
    }
}
