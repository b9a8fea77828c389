//! Operator controls: per-endpoint threat levels and the global
//! emergency override.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use warden_core::error::{WardenError, WardenResult};
use warden_core::events::EventSink;
use warden_core::models::event::{NewSecurityEvent, SecurityEventType, Severity};
use warden_core::models::rate_limit::{EmergencyOverride, ThreatLevel};
use warden_core::store::{KeyedStore, bounded};

use crate::limiter::RateLimiter;

/// An active threat level for one endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreatLevelState {
    pub endpoint: String,
    pub level: ThreatLevel,
    pub multiplier: f64,
    pub set_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// `now + duration`, saturating at the largest representable instant.
pub(crate) fn expires_after(now: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl<S: KeyedStore, E: EventSink> RateLimiter<S, E> {
    fn threat_key(&self, endpoint: &str) -> String {
        self.keys.key(&["rl", "threat", endpoint])
    }

    fn override_key(&self) -> String {
        self.keys.key(&["rl", "override"])
    }

    /// The active threat level for `endpoint`, or `None` when unset or
    /// expired.
    pub async fn threat_level(&self, endpoint: &str) -> WardenResult<ThreatLevel> {
        Ok(self
            .threat_state(endpoint)
            .await?
            .map_or(ThreatLevel::None, |state| state.level))
    }

    pub async fn threat_state(&self, endpoint: &str) -> WardenResult<Option<ThreatLevelState>> {
        let raw = bounded(
            self.keys.timeout(),
            "get",
            self.store.get(&self.threat_key(endpoint)),
        )
        .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let state: ThreatLevelState = serde_json::from_str(&raw)?;
        if state.expires_at <= self.clock.now() {
            return Ok(None);
        }
        Ok(Some(state))
    }

    /// Tighten limits for `endpoint` for `duration`. `level` is parsed
    /// case-insensitively; setting `none` clears the endpoint.
    pub async fn set_threat_level(
        &self,
        endpoint: &str,
        level: &str,
        duration: Duration,
    ) -> WardenResult<Option<ThreatLevelState>> {
        let level: ThreatLevel = level.parse()?;
        if endpoint.trim().is_empty() {
            return Err(WardenError::validation("endpoint must not be empty"));
        }
        if duration.is_zero() {
            return Err(WardenError::validation("threat level duration must be positive"));
        }
        if level == ThreatLevel::None {
            self.clear_threat_level(endpoint).await?;
            return Ok(None);
        }

        let now = self.clock.now();
        let state = ThreatLevelState {
            endpoint: endpoint.to_string(),
            level,
            multiplier: self.config.threat_multipliers.for_level(level),
            set_at: now,
            expires_at: expires_after(now, duration),
        };
        let payload = serde_json::to_string(&state)?;
        bounded(
            self.keys.timeout(),
            "set",
            self.store.set(&self.threat_key(endpoint), &payload, duration),
        )
        .await?;

        warn!(
            endpoint,
            level = level.as_str(),
            multiplier = state.multiplier,
            "Threat level raised"
        );
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::ThreatLevelChanged, Severity::High)
                    .details(json!({
                        "endpoint": endpoint,
                        "level": level.as_str(),
                        "multiplier": state.multiplier,
                        "expires_at": state.expires_at,
                    })),
            )
            .await;
        Ok(Some(state))
    }

    pub async fn clear_threat_level(&self, endpoint: &str) -> WardenResult<bool> {
        let existed = bounded(
            self.keys.timeout(),
            "delete",
            self.store.delete(&self.threat_key(endpoint)),
        )
        .await?;
        if existed {
            info!(endpoint, "Threat level cleared");
            self.events
                .record(
                    NewSecurityEvent::new(SecurityEventType::ThreatLevelChanged, Severity::Medium)
                        .details(json!({ "endpoint": endpoint, "level": "none" })),
                )
                .await;
        }
        Ok(existed)
    }

    /// Disable enforcement globally for at most `max_override_secs`. Covers
    /// rate limits and IP blocks; existing blocks apply again once it ends.
    pub async fn activate_emergency_override(
        &self,
        reason: &str,
        operator: &str,
        duration: Duration,
    ) -> WardenResult<EmergencyOverride> {
        if reason.trim().is_empty() || operator.trim().is_empty() {
            return Err(WardenError::validation(
                "emergency override requires a reason and an operator",
            ));
        }
        let duration = duration.min(Duration::from_secs(self.config.max_override_secs));
        if duration.is_zero() {
            return Err(WardenError::validation("override duration must be positive"));
        }

        let now = self.clock.now();
        let state = EmergencyOverride {
            enforcement_disabled: true,
            reason: reason.to_string(),
            operator: operator.to_string(),
            activated_at: now,
            expires_at: expires_after(now, duration),
        };
        let payload = serde_json::to_string(&state)?;
        bounded(
            self.keys.timeout(),
            "set",
            self.store.set(&self.override_key(), &payload, duration),
        )
        .await?;

        error!(
            operator,
            reason,
            expires_at = %state.expires_at,
            "Rate limit enforcement disabled by emergency override"
        );
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::EmergencyOverride, Severity::Critical)
                    .details(json!({
                        "action": "activate",
                        "operator": operator,
                        "reason": reason,
                        "expires_at": state.expires_at,
                    })),
            )
            .await;
        Ok(state)
    }

    /// Re-enable enforcement. Returns whether an override was active.
    pub async fn deactivate_emergency_override(&self, operator: &str) -> WardenResult<bool> {
        let existed = bounded(
            self.keys.timeout(),
            "delete",
            self.store.delete(&self.override_key()),
        )
        .await?;
        info!(operator, existed, "Emergency override deactivated");
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::EmergencyOverride, Severity::Critical)
                    .details(json!({ "action": "deactivate", "operator": operator })),
            )
            .await;
        Ok(existed)
    }

    pub async fn emergency_status(&self) -> WardenResult<Option<EmergencyOverride>> {
        let raw = bounded(
            self.keys.timeout(),
            "get",
            self.store.get(&self.override_key()),
        )
        .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let state: EmergencyOverride = serde_json::from_str(&raw)?;
        Ok((state.expires_at > self.clock.now()).then_some(state))
    }

    /// Whether an override currently disables enforcement. A failed
    /// lookup leaves enforcement on.
    pub(crate) async fn enforcement_disabled(&self) -> bool {
        match self.emergency_status().await {
            Ok(state) => state.is_some_and(|s| s.enforcement_disabled),
            Err(e) => {
                warn!(error = %e, "Emergency override lookup failed");
                false
            }
        }
    }
}
