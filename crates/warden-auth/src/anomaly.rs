//! Suspicious-activity detection.
//!
//! Every signal is independent and adds a fixed weight, so the score is
//! a plain sum that can be explained factor by factor. The detector only
//! reads session-related state. On critical risk it asks a
//! [`SessionInvalidator`] to end the account's sessions; it never writes
//! session records itself.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;

use regex::{RegexSet, RegexSetBuilder};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_core::clock::Clock;
use warden_core::error::{WardenError, WardenResult};
use warden_core::events::{EventSink, SecurityEvents};
use warden_core::models::device::DeviceProfile;
use warden_core::models::event::{NewSecurityEvent, SecurityEventType, Severity};
use warden_core::models::risk::{RiskAssessment, RiskFactor, RiskFactorKind, RiskLevel};
use warden_core::models::session::{InvalidationReason, InvalidationSummary};
use warden_core::store::KeyedStore;
use warden_guard::{RateLimiter, is_ip};

use crate::config::AnomalyConfig;
use crate::device::DeviceTracker;

/// The authority that may end sessions.
pub trait SessionInvalidator: Send + Sync {
    fn invalidate_all_user_sessions(
        &self,
        account_id: Uuid,
        reason: InvalidationReason,
        blacklist_tokens: bool,
    ) -> impl Future<Output = WardenResult<InvalidationSummary>> + Send;
}

/// An address range in CIDR notation. A bare address is a /32 or /128.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    network: IpAddr,
    prefix: u8,
}

impl IpRange {
    pub fn parse(s: &str) -> Result<Self, WardenError> {
        let invalid = || WardenError::validation(format!("invalid IP range: {s}"));
        let (addr, prefix) = match s.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix.parse::<u8>().map_err(|_| invalid())?)),
            None => (s.trim(), None),
        };
        let network: IpAddr = addr.parse().map_err(|_| invalid())?;
        let max = if network.is_ipv4() { 32 } else { 128 };
        let prefix = prefix.unwrap_or(max);
        if prefix > max {
            return Err(invalid());
        }
        Ok(Self { network, prefix })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix)).unwrap_or(0);
                u32::from(net) & mask == u32::from(*ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix)).unwrap_or(0);
                u128::from(net) & mask == u128::from(*ip) & mask
            }
            _ => false,
        }
    }
}

pub struct AnomalyDetector<S: KeyedStore, E: EventSink> {
    devices: DeviceTracker<S>,
    guard: Arc<RateLimiter<S, E>>,
    events: SecurityEvents<E>,
    clock: Arc<dyn Clock>,
    config: AnomalyConfig,
    bot_patterns: RegexSet,
    suspicious_ranges: Vec<IpRange>,
}

impl<S: KeyedStore, E: EventSink> AnomalyDetector<S, E> {
    /// Fails when a bot pattern or IP range does not parse.
    pub fn new(
        devices: DeviceTracker<S>,
        guard: Arc<RateLimiter<S, E>>,
        events: SecurityEvents<E>,
        clock: Arc<dyn Clock>,
        config: AnomalyConfig,
    ) -> WardenResult<Self> {
        let bot_patterns = RegexSetBuilder::new(&config.bot_user_agent_patterns)
            .case_insensitive(true)
            .build()
            .map_err(|e| WardenError::validation(format!("invalid bot pattern: {e}")))?;
        let suspicious_ranges = config
            .suspicious_ip_ranges
            .iter()
            .map(|s| IpRange::parse(s))
            .collect::<WardenResult<Vec<_>>>()?;

        Ok(Self {
            devices,
            guard,
            events,
            clock,
            config,
            bot_patterns,
            suspicious_ranges,
        })
    }

    pub fn config(&self) -> &AnomalyConfig {
        &self.config
    }

    pub fn is_bot_user_agent(&self, user_agent: Option<&str>) -> bool {
        match user_agent.map(str::trim) {
            None | Some("") => true,
            Some(ua) => self.bot_patterns.is_match(ua),
        }
    }

    pub fn risk_level(&self, score: u32) -> RiskLevel {
        let t = &self.config.thresholds;
        if score >= t.critical {
            RiskLevel::Critical
        } else if score >= t.high {
            RiskLevel::High
        } else if score >= t.medium {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }

    /// Score a login without side effects.
    pub async fn assess(&self, account_id: Uuid, profile: &DeviceProfile) -> WardenResult<RiskAssessment> {
        let weights = &self.config.weights;
        let history = self.devices.history_map(account_id).await?;
        let mut factors = Vec::new();

        let is_new_device = !history.contains_key(&profile.fingerprint);
        if is_new_device {
            factors.push(RiskFactor {
                kind: RiskFactorKind::NewDevice,
                weight: weights.new_device,
                detail: format!("device {} never seen for this account", short(&profile.fingerprint)),
            });
        }

        if let Some(ip) = profile.ip_address.as_deref() {
            let known_ips = self.devices.known_ips(account_id).await?;
            if !known_ips.is_empty() && !known_ips.contains(ip) {
                factors.push(RiskFactor {
                    kind: RiskFactorKind::NewIpAddress,
                    weight: weights.new_ip_address,
                    detail: format!("IP {ip} not among {} known addresses", known_ips.len()),
                });
            }
            if let Some(reason) = self.suspicious_ip(ip).await? {
                factors.push(RiskFactor {
                    kind: RiskFactorKind::SuspiciousIp,
                    weight: weights.suspicious_ip,
                    detail: reason,
                });
            }
        }

        if self.is_bot_user_agent(profile.user_agent.as_deref()) {
            factors.push(RiskFactor {
                kind: RiskFactorKind::BotUserAgent,
                weight: weights.bot_user_agent,
                detail: match profile.user_agent.as_deref() {
                    Some(ua) if !ua.trim().is_empty() => format!("user-agent matches automation: {ua}"),
                    _ => "missing user-agent".into(),
                },
            });
        }

        let window_start = self.clock.now()
            - chrono::Duration::seconds(self.config.rapid_switch_window_secs as i64);
        let mut recent: HashSet<&str> = history
            .values()
            .filter(|r| r.last_seen > window_start)
            .map(|r| r.fingerprint.as_str())
            .collect();
        recent.insert(profile.fingerprint.as_str());
        if recent.len() > self.config.rapid_switch_max_devices {
            factors.push(RiskFactor {
                kind: RiskFactorKind::RapidDeviceSwitching,
                weight: weights.rapid_device_switching,
                detail: format!(
                    "{} distinct devices within {}s",
                    recent.len(),
                    self.config.rapid_switch_window_secs
                ),
            });
        }

        if let Some(tz) = profile.timezone.as_deref() {
            let known = self.devices.known_timezones(account_id).await?;
            if !known.is_empty() && !known.contains(tz) {
                factors.push(RiskFactor {
                    kind: RiskFactorKind::NewTimezone,
                    weight: weights.new_timezone,
                    detail: format!("first login from timezone {tz}"),
                });
            }
        }

        let score = factors.iter().map(|f| f.weight).sum();
        let risk_level = self.risk_level(score);
        Ok(RiskAssessment {
            is_suspicious: risk_level >= RiskLevel::Medium,
            score,
            risk_level,
            factors,
            is_new_device,
            sessions_invalidated: false,
            fault: None,
        })
    }

    async fn suspicious_ip(&self, ip: &str) -> WardenResult<Option<String>> {
        let Ok(addr) = ip.parse::<IpAddr>() else {
            return Ok(Some(format!("unparseable IP address {ip}")));
        };
        if let Some(range) = self.suspicious_ranges.iter().find(|r| r.contains(&addr)) {
            return Ok(Some(format!("IP {ip} in suspicious range {}/{}", range.network, range.prefix)));
        }
        let reputation = self.guard.get_ip_reputation(ip).await?;
        if reputation <= self.config.suspicious_reputation {
            return Ok(Some(format!("IP {ip} reputation {reputation}")));
        }
        if self.guard.check_ip_block(ip).await.blocked {
            return Ok(Some(format!("IP {ip} is blocked")));
        }
        Ok(None)
    }

    /// Score a login and act on the result: alert on medium or higher,
    /// penalize the IP's reputation, and end every session of the account
    /// on critical risk. Never fails; a store fault yields a neutral
    /// assessment carrying the fault.
    pub async fn detect_suspicious_activity<I: SessionInvalidator>(
        &self,
        account_id: Uuid,
        profile: &DeviceProfile,
        invalidator: &I,
    ) -> RiskAssessment {
        let mut assessment = match self.assess(account_id, profile).await {
            Ok(assessment) => assessment,
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Anomaly detection unavailable");
                return RiskAssessment::unavailable(e.to_string());
            }
        };

        if !assessment.is_suspicious {
            return assessment;
        }

        let factor_names: Vec<&str> = assessment.factors.iter().map(|f| f.kind.as_str()).collect();
        warn!(
            account_id = %account_id,
            score = assessment.score,
            risk_level = %assessment.risk_level,
            factors = ?factor_names,
            "Suspicious activity detected"
        );
        self.events
            .record(
                NewSecurityEvent::new(
                    SecurityEventType::SuspiciousActivity,
                    match assessment.risk_level {
                        RiskLevel::Critical => Severity::Critical,
                        RiskLevel::High => Severity::High,
                        _ => Severity::Medium,
                    },
                )
                .account(account_id)
                .ip(profile.ip_address.as_deref())
                .device(&profile.fingerprint)
                .details(json!({
                    "score": assessment.score,
                    "risk_level": assessment.risk_level,
                    "factors": assessment.factors,
                })),
            )
            .await;

        if let Some(ip) = profile.ip_address.as_deref().filter(|ip| is_ip(ip)) {
            if let Err(e) = self
                .guard
                .penalize_ip(ip, self.config.reputation_penalty, "suspicious_activity")
                .await
            {
                warn!(ip, error = %e, "Reputation penalty failed");
            }
        }

        if assessment.risk_level == RiskLevel::Critical {
            error!(
                account_id = %account_id,
                score = assessment.score,
                "Critical anomaly, invalidating all sessions"
            );
            self.events
                .record(
                    NewSecurityEvent::new(SecurityEventType::CriticalAnomaly, Severity::Critical)
                        .account(account_id)
                        .ip(profile.ip_address.as_deref())
                        .device(&profile.fingerprint)
                        .details(json!({ "score": assessment.score, "factors": factor_names })),
                )
                .await;
            match invalidator
                .invalidate_all_user_sessions(account_id, InvalidationReason::CriticalAnomaly, true)
                .await
            {
                Ok(summary) => {
                    info!(
                        account_id = %account_id,
                        sessions_invalidated = summary.sessions_invalidated,
                        "Sessions invalidated after critical anomaly"
                    );
                    assessment.sessions_invalidated = true;
                }
                Err(e) => {
                    error!(account_id = %account_id, error = %e, "Mass invalidation failed");
                    assessment.fault = Some(e.to_string());
                }
            }
        }

        assessment
    }
}

/// First 12 characters of a fingerprint, for log-friendly details.
fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_ranges() {
        let range = IpRange::parse("198.51.100.0/24").unwrap();
        assert!(range.contains(&"198.51.100.77".parse().unwrap()));
        assert!(!range.contains(&"198.51.101.1".parse().unwrap()));
        assert!(!range.contains(&"::1".parse().unwrap()));

        let everything = IpRange::parse("0.0.0.0/0").unwrap();
        assert!(everything.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn bare_addresses_and_ipv6() {
        let single = IpRange::parse("203.0.113.5").unwrap();
        assert!(single.contains(&"203.0.113.5".parse().unwrap()));
        assert!(!single.contains(&"203.0.113.6".parse().unwrap()));

        let v6 = IpRange::parse("2001:db8::/32").unwrap();
        assert!(v6.contains(&"2001:db8:1::1".parse().unwrap()));
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        assert!(IpRange::parse("10.0.0.0/33").is_err());
        assert!(IpRange::parse("not-an-ip/8").is_err());
    }
}
