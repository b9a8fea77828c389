//! Progressive delay, IP reputation and exponential-backoff blocking.

use std::net::IpAddr;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info, warn};
use warden_core::error::{WardenError, WardenResult};
use warden_core::events::EventSink;
use warden_core::models::event::{NewSecurityEvent, SecurityEventType, Severity};
use warden_core::models::ip::{IpBlockRecord, IpBlockStatus, REPUTATION_THRESHOLD_EXCEEDED};
use warden_core::store::{KeyedStore, bounded};

use crate::limiter::RateLimiter;
use crate::threat::expires_after;

pub fn is_ip(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok()
}

/// `min(base × 2^(attempt-1), max)`. Attempt 0 counts as the first.
pub fn progressive_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exponent = attempt.max(1) - 1;
    let factor = 1u32.checked_shl(exponent).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(max).min(max)
}

#[derive(Debug, Clone, Default)]
pub struct DelayOptions {
    pub base_delay: Option<Duration>,
    pub max_delay: Option<Duration>,
    /// Sleep for the computed delay before returning.
    pub sleep: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressiveDelay {
    pub delay: Duration,
    /// Reputation after the penalty; `None` for non-IP identifiers or
    /// when the store was unreachable.
    pub reputation: Option<i64>,
    /// Whether this call pushed the IP into a block.
    pub blocked: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BlockOptions {
    /// Base duration instead of the configured one.
    pub duration: Option<Duration>,
    /// Overrides the configured backoff flag.
    pub backoff: Option<bool>,
}

impl<S: KeyedStore, E: EventSink> RateLimiter<S, E> {
    fn reputation_key(&self, ip: &str) -> String {
        self.keys.key(&["ip", "reputation", ip])
    }

    fn block_key(&self, ip: &str) -> String {
        self.keys.key(&["ip", "block", ip])
    }

    fn block_level_key(&self, ip: &str) -> String {
        self.keys.key(&["ip", "block_level", ip])
    }

    /// Compute the delay for a failed attempt and penalize the
    /// identifier's reputation when it is an IP. Store failures are
    /// logged and otherwise ignored.
    pub async fn apply_progressive_delay(
        &self,
        identifier: &str,
        attempt: u32,
        opts: DelayOptions,
    ) -> ProgressiveDelay {
        let base = opts
            .base_delay
            .unwrap_or(Duration::from_millis(self.config.delay.base_delay_ms));
        let max = opts
            .max_delay
            .unwrap_or(Duration::from_millis(self.config.delay.max_delay_ms));
        let delay = progressive_delay(base, max, attempt);

        let mut result = ProgressiveDelay {
            delay,
            reputation: None,
            blocked: false,
        };

        if is_ip(identifier) {
            match self
                .penalize_ip(identifier, self.config.delay.reputation_penalty, "progressive_delay")
                .await
            {
                Ok((reputation, blocked)) => {
                    result.reputation = Some(reputation);
                    result.blocked = blocked;
                }
                Err(e) => warn!(ip = identifier, error = %e, "Reputation update failed"),
            }
        }

        debug!(identifier, attempt, delay_ms = delay.as_millis() as u64, "Progressive delay");
        if opts.sleep {
            tokio::time::sleep(delay).await;
        }
        result
    }

    /// Subtract `penalty` from an IP's reputation and block it once the
    /// score reaches the critical threshold. Returns the new score and
    /// whether a block was placed.
    pub async fn penalize_ip(
        &self,
        ip: &str,
        penalty: i64,
        cause: &str,
    ) -> WardenResult<(i64, bool)> {
        validate_ip(ip)?;
        let ttl = Duration::from_secs(self.config.delay.reputation_ttl_secs);
        let reputation = bounded(
            self.keys.timeout(),
            "incr_by",
            self.store
                .incr_by(&self.reputation_key(ip), -penalty.abs(), ttl),
        )
        .await?;

        debug!(ip, reputation, cause, "IP reputation decreased");

        if reputation > self.config.delay.critical_reputation {
            return Ok((reputation, false));
        }

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::ReputationDegraded, Severity::High)
                    .ip(Some(ip))
                    .details(json!({
                        "reputation": reputation,
                        "threshold": self.config.delay.critical_reputation,
                        "cause": cause,
                    })),
            )
            .await;
        self.block_ip(ip, REPUTATION_THRESHOLD_EXCEEDED, BlockOptions::default())
            .await?;
        Ok((reputation, true))
    }

    /// Current reputation score; 0 for unknown IPs.
    pub async fn get_ip_reputation(&self, ip: &str) -> WardenResult<i64> {
        validate_ip(ip)?;
        let raw = bounded(
            self.keys.timeout(),
            "get",
            self.store.get(&self.reputation_key(ip)),
        )
        .await?;
        match raw {
            None => Ok(0),
            Some(raw) => raw
                .parse()
                .map_err(|_| WardenError::Store(format!("corrupt reputation for {ip}"))),
        }
    }

    /// Block an IP. A block placed while another is active escalates the
    /// level instead of resetting it.
    pub async fn block_ip(
        &self,
        ip: &str,
        reason: &str,
        opts: BlockOptions,
    ) -> WardenResult<IpBlockRecord> {
        validate_ip(ip)?;
        let backoff = opts.backoff.unwrap_or(self.config.block.backoff);
        let base = opts
            .duration
            .unwrap_or(Duration::from_secs(self.config.block.base_duration_secs));
        let cap = Duration::from_secs(self.config.block.max_duration_secs).max(base);

        // With backoff the counter moves in steps of two, so a first block
        // lands on level 1 and each re-block adds two levels.
        let level_key = self.block_level_key(ip);
        let step = if backoff { 2 } else { 1 };
        let raw = bounded(
            self.keys.timeout(),
            "incr_by",
            self.store.incr_by(&level_key, step, cap),
        )
        .await?;
        let level = u32::try_from(if backoff { raw - 1 } else { raw })
            .unwrap_or(1)
            .max(1);

        let duration = if backoff {
            let factor = 1u32.checked_shl(level - 1).unwrap_or(u32::MAX);
            base.checked_mul(factor).unwrap_or(cap).min(cap)
        } else {
            base
        };

        let now = self.clock.now();
        let record = IpBlockRecord {
            ip: ip.to_string(),
            level,
            reason: reason.to_string(),
            blocked_at: now,
            expires_at: expires_after(now, duration),
            duration_secs: duration.as_secs(),
        };
        let payload = serde_json::to_string(&record)?;
        bounded(
            self.keys.timeout(),
            "set",
            self.store.set(&self.block_key(ip), &payload, duration),
        )
        .await?;
        bounded(
            self.keys.timeout(),
            "expire",
            self.store.expire(&level_key, duration),
        )
        .await?;

        warn!(ip, level, reason, duration_secs = record.duration_secs, "IP blocked");
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::IpBlocked, Severity::High)
                    .ip(Some(ip))
                    .details(json!({
                        "reason": reason,
                        "level": level,
                        "duration_secs": record.duration_secs,
                        "expires_at": record.expires_at,
                    })),
            )
            .await;
        Ok(record)
    }

    /// Block status for an IP. Expired blocks are removed on sight; store
    /// faults report the IP as not blocked. Blocks stay on record but are
    /// not enforced while an emergency override is active.
    pub async fn check_ip_block(&self, ip: &str) -> IpBlockStatus {
        if !is_ip(ip) {
            return IpBlockStatus::clear();
        }
        if self.enforcement_disabled().await {
            debug!(ip, "Emergency override active, IP block not enforced");
            return IpBlockStatus::clear();
        }
        match self.load_block(ip).await {
            Ok(Some(record)) => {
                let now = self.clock.now();
                let retry_after = (record.expires_at - now).num_seconds().max(1) as u64;
                IpBlockStatus {
                    blocked: true,
                    record: Some(record),
                    retry_after_secs: Some(retry_after),
                    fault: None,
                }
            }
            Ok(None) => IpBlockStatus::clear(),
            Err(e) => {
                warn!(ip, error = %e, "IP block lookup failed, allowing request");
                IpBlockStatus {
                    fault: Some(e.to_string()),
                    ..IpBlockStatus::clear()
                }
            }
        }
    }

    async fn load_block(&self, ip: &str) -> WardenResult<Option<IpBlockRecord>> {
        let key = self.block_key(ip);
        let raw = bounded(self.keys.timeout(), "get", self.store.get(&key)).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let record: IpBlockRecord = serde_json::from_str(&raw)?;
        if record.expires_at <= self.clock.now() {
            bounded(self.keys.timeout(), "delete", self.store.delete(&key)).await?;
            debug!(ip, "Removed expired IP block");
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Lift a block and forget its escalation level.
    pub async fn unblock_ip(&self, ip: &str, operator: &str) -> WardenResult<bool> {
        validate_ip(ip)?;
        let existed = bounded(
            self.keys.timeout(),
            "delete",
            self.store.delete(&self.block_key(ip)),
        )
        .await?;
        bounded(
            self.keys.timeout(),
            "delete",
            self.store.delete(&self.block_level_key(ip)),
        )
        .await?;

        if existed {
            info!(ip, operator, "IP unblocked");
            self.events
                .record(
                    NewSecurityEvent::new(SecurityEventType::IpUnblocked, Severity::Medium)
                        .ip(Some(ip))
                        .details(json!({ "operator": operator })),
                )
                .await;
        }
        Ok(existed)
    }
}

fn validate_ip(ip: &str) -> WardenResult<()> {
    if is_ip(ip) {
        Ok(())
    } else {
        Err(WardenError::validation(format!("invalid IP address: {ip}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_and_clamps() {
        let base = Duration::from_millis(1_000);
        let max = Duration::from_millis(30_000);
        assert_eq!(progressive_delay(base, max, 1), Duration::from_millis(1_000));
        assert_eq!(progressive_delay(base, max, 3), Duration::from_millis(4_000));
        assert_eq!(progressive_delay(base, max, 10), max);
        assert_eq!(progressive_delay(base, max, 0), base);
        assert_eq!(progressive_delay(base, max, u32::MAX), max);
    }

    #[test]
    fn ip_detection() {
        assert!(is_ip("10.0.0.1"));
        assert!(is_ip("::1"));
        assert!(!is_ip("user@example.com"));
        assert!(!is_ip("999.1.1.1"));
    }
}
