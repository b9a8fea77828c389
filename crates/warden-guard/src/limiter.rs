//! Sliding-window rate limiting.

use std::net::IpAddr;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;
use warden_core::clock::Clock;
use warden_core::error::{WardenError, WardenResult};
use warden_core::events::{EventSink, SecurityEvents};
use warden_core::models::event::{NewSecurityEvent, SecurityEventType, Severity};
use warden_core::models::rate_limit::{LimitType, RateLimitOutcome, ThreatLevel};
use warden_core::store::{KeyedStore, StoreConfig, bounded};

use crate::config::{RateLimitConfig, WindowConfig};
use crate::threat::expires_after;

/// Per-call overrides for [`RateLimiter::check_rate_limit`].
#[derive(Debug, Clone, Default)]
pub struct RateLimitOptions {
    /// Endpoint whose threat level scales the limit.
    pub endpoint: Option<String>,
    /// Replaces the limit type's default window.
    pub window: Option<WindowConfig>,
}

impl RateLimitOptions {
    pub fn endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            window: None,
        }
    }
}

/// Rate limiter and IP reputation engine.
///
/// The only writer of rate-limit windows, threat levels, reputation
/// scores and IP block records.
pub struct RateLimiter<S: KeyedStore, E: EventSink> {
    pub(crate) store: S,
    pub(crate) events: SecurityEvents<E>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) config: RateLimitConfig,
    pub(crate) keys: StoreConfig,
}

impl<S: KeyedStore, E: EventSink> RateLimiter<S, E> {
    pub fn new(
        store: S,
        events: SecurityEvents<E>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
        keys: StoreConfig,
    ) -> Self {
        Self {
            store,
            events,
            clock,
            config,
            keys,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn window_key(&self, identifier: &str, limit_type: LimitType) -> String {
        self.keys.key(&["rl", limit_type.as_str(), identifier])
    }

    /// Count this request against `identifier`'s window for `limit_type`.
    ///
    /// Never fails: if the store cannot be reached the request is allowed
    /// and `fault` describes what went wrong.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        limit_type: LimitType,
        opts: RateLimitOptions,
    ) -> RateLimitOutcome {
        let window = opts
            .window
            .unwrap_or_else(|| self.config.limits.for_type(limit_type));
        let now = self.clock.now();
        let reset_at = expires_after(now, window.window());

        if self.enforcement_disabled().await {
            debug!(identifier, limit_type = limit_type.as_str(), "Enforcement disabled by override");
            return RateLimitOutcome {
                allowed: true,
                count: 0,
                remaining: window.max_requests,
                blocked: false,
                limit: window.max_requests,
                reset_at,
                retry_after_secs: None,
                fault: None,
            };
        }

        let threat = match opts.endpoint.as_deref() {
            Some(endpoint) => self.threat_level(endpoint).await.unwrap_or_else(|e| {
                warn!(endpoint, error = %e, "Threat level lookup failed, using none");
                ThreatLevel::None
            }),
            None => ThreatLevel::None,
        };
        let limit = self.effective_max(window.max_requests, threat);

        let key = self.window_key(identifier, limit_type);
        let member = format!("{}-{}", now.timestamp_millis(), Uuid::new_v4());
        let hit = bounded(
            self.keys.timeout(),
            "window_hit",
            self.store
                .window_hit(&key, now.timestamp_millis(), window.window(), &member),
        )
        .await;

        let count = match hit {
            Ok(count) => count,
            Err(e) => {
                return self
                    .fail_open(identifier, limit_type, limit, reset_at, e)
                    .await;
            }
        };

        let allowed = count <= limit;
        let outcome = RateLimitOutcome {
            allowed,
            count,
            remaining: limit.saturating_sub(count),
            blocked: !allowed,
            limit,
            reset_at,
            retry_after_secs: (!allowed).then_some(window.window_secs),
            fault: None,
        };

        if !allowed {
            warn!(
                identifier,
                limit_type = limit_type.as_str(),
                count,
                limit,
                threat_level = threat.as_str(),
                "Rate limit exceeded"
            );
            self.events
                .record(
                    NewSecurityEvent::new(SecurityEventType::RateLimitExceeded, Severity::Medium)
                        .ip(ip_of(identifier))
                        .details(json!({
                            "identifier": identifier,
                            "limit_type": limit_type.as_str(),
                            "count": count,
                            "limit": limit,
                            "threat_level": threat.as_str(),
                            "endpoint": opts.endpoint,
                        })),
                )
                .await;
        }

        outcome
    }

    /// Clear an identifier's window.
    pub async fn reset_rate_limit(
        &self,
        identifier: &str,
        limit_type: LimitType,
    ) -> WardenResult<bool> {
        let key = self.window_key(identifier, limit_type);
        let existed = bounded(self.keys.timeout(), "delete", self.store.delete(&key)).await?;
        debug!(identifier, limit_type = limit_type.as_str(), existed, "Rate limit reset");
        Ok(existed)
    }

    /// Entries currently in an identifier's window, without counting a
    /// new request.
    pub async fn current_usage(
        &self,
        identifier: &str,
        limit_type: LimitType,
    ) -> WardenResult<u64> {
        let window = self.config.limits.for_type(limit_type);
        let key = self.window_key(identifier, limit_type);
        bounded(
            self.keys.timeout(),
            "window_count",
            self.store
                .window_count(&key, self.clock.now_millis(), window.window()),
        )
        .await
    }

    fn effective_max(&self, max_requests: u64, threat: ThreatLevel) -> u64 {
        let multiplier = self.config.threat_multipliers.for_level(threat);
        ((max_requests as f64 * multiplier).floor() as u64).max(1)
    }

    async fn fail_open(
        &self,
        identifier: &str,
        limit_type: LimitType,
        limit: u64,
        reset_at: chrono::DateTime<chrono::Utc>,
        error: WardenError,
    ) -> RateLimitOutcome {
        warn!(
            identifier,
            limit_type = limit_type.as_str(),
            error = %error,
            "Rate limit check failed, allowing request"
        );
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::StoreFault, Severity::High)
                    .ip(ip_of(identifier))
                    .details(json!({
                        "operation": "check_rate_limit",
                        "limit_type": limit_type.as_str(),
                        "error": error.to_string(),
                    })),
            )
            .await;
        RateLimitOutcome {
            allowed: true,
            count: 0,
            remaining: limit,
            blocked: false,
            limit,
            reset_at,
            retry_after_secs: None,
            fault: Some(error.to_string()),
        }
    }
}

/// The identifier itself when it is an IP address.
pub(crate) fn ip_of(identifier: &str) -> Option<&str> {
    identifier.parse::<IpAddr>().is_ok().then_some(identifier)
}
