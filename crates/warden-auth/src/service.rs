//! Session manager — token issuance, validation, refresh and revocation.
//!
//! The session manager is the only writer of session records. Every
//! other component that wants a session ended goes through
//! [`SessionInvalidator`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::clock::Clock;
use warden_core::error::WardenResult;
use warden_core::events::{EventSink, SecurityEvents};
use warden_core::models::device::{DeviceRecord, RequestMeta};
use warden_core::models::event::{NewSecurityEvent, SecurityEventType, Severity};
use warden_core::models::rate_limit::LimitType;
use warden_core::models::risk::RiskAssessment;
use warden_core::models::session::{
    BulkInvalidationItem, BulkInvalidationResult, InvalidationReason, InvalidationSummary,
    SessionRecord, SessionRisk,
};
use warden_core::store::{AccountStore, KeyedStore, StoreConfig, bounded};
use warden_crypto::primitives::constant_time_eq;
use warden_guard::{RateLimitOptions, RateLimiter};

use crate::anomaly::{AnomalyDetector, SessionInvalidator};
use crate::config::{AnomalyConfig, AuthConfig};
use crate::device::{DeviceHistoryLimits, DeviceTracker, create_device_profile};
use crate::error::{AuthError, TokenRejection};
use crate::token::{SessionBinding, TokenClaims, TokenKind, TokenSigner, token_hash};

/// A freshly minted token pair.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: Uuid,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    /// Access token lifetime in seconds.
    pub expires_in: u64,
}

/// Result of a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub tokens: TokenPair,
    pub session: SessionRecord,
    /// High or critical risk means the caller should demand extra
    /// verification before trusting the session.
    pub assessment: RiskAssessment,
}

/// A token that passed every check, with the session it belongs to.
#[derive(Debug, Clone)]
pub struct ValidatedToken {
    pub claims: TokenClaims,
    pub session: SessionRecord,
}

/// A new access token minted from a refresh token.
#[derive(Debug, Clone)]
pub struct RefreshedAccess {
    pub access_token: String,
    pub session_id: Uuid,
    pub access_expires_at: DateTime<Utc>,
    pub expires_in: u64,
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Session and token lifecycle manager.
///
/// Generic over store implementations so that the auth layer has no
/// dependency on the store crate.
pub struct SessionManager<S, A, E>
where
    S: KeyedStore + Clone,
    A: AccountStore,
    E: EventSink + Clone,
{
    store: S,
    accounts: A,
    guard: Arc<RateLimiter<S, E>>,
    detector: AnomalyDetector<S, E>,
    devices: DeviceTracker<S>,
    signer: TokenSigner,
    events: SecurityEvents<E>,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
    keys: StoreConfig,
}

impl<S, A, E> SessionManager<S, A, E>
where
    S: KeyedStore + Clone,
    A: AccountStore,
    E: EventSink + Clone,
{
    /// Wire the manager together with its device tracker and anomaly
    /// detector. Fails on unusable secrets, bot patterns or IP ranges.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: S,
        accounts: A,
        guard: Arc<RateLimiter<S, E>>,
        events: SecurityEvents<E>,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
        anomaly: AnomalyConfig,
        keys: StoreConfig,
    ) -> WardenResult<Self> {
        let signer = TokenSigner::new(&config, Arc::clone(&clock))?;
        let devices = DeviceTracker::new(
            store.clone(),
            keys.clone(),
            Arc::clone(&clock),
            DeviceHistoryLimits::from(&anomaly),
        );
        let detector = AnomalyDetector::new(
            devices.clone(),
            Arc::clone(&guard),
            events.clone(),
            Arc::clone(&clock),
            anomaly,
        )?;

        Ok(Self {
            store,
            accounts,
            guard,
            detector,
            devices,
            signer,
            events,
            clock,
            config,
            keys,
        })
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn detector(&self) -> &AnomalyDetector<S, E> {
        &self.detector
    }

    fn session_key(&self, session_id: Uuid) -> String {
        self.keys.key(&["session", &session_id.to_string()])
    }

    fn activity_key(&self, session_id: Uuid) -> String {
        self.keys.key(&["session_activity", &session_id.to_string()])
    }

    fn index_key(&self, account_id: Uuid) -> String {
        self.keys.key(&["account_sessions", &account_id.to_string()])
    }

    fn blacklist_key(&self, token: &str) -> String {
        self.keys.key(&["blacklist", &token_hash(token)])
    }

    fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.config.refresh_token_lifetime_secs)
    }

    // -------------------------------------------------------------------
    // Issuance
    // -------------------------------------------------------------------

    /// Create a session for an authenticated account and mint its token
    /// pair.
    ///
    /// The caller has already verified credentials. This checks the IP
    /// block list and the auth rate limit, scores the login, and binds
    /// the session to the requesting device.
    pub async fn generate_token_pair(
        &self,
        account_id: Uuid,
        meta: &RequestMeta,
    ) -> Result<IssuedSession, AuthError> {
        let identifier = meta
            .ip_address
            .clone()
            .unwrap_or_else(|| account_id.to_string());

        if let Some(ip) = meta.ip_address.as_deref() {
            let block = self.guard.check_ip_block(ip).await;
            if block.blocked {
                info!(account_id = %account_id, ip, "Token issuance refused for blocked IP");
                return Err(AuthError::RateLimited {
                    retry_after_secs: block.retry_after_secs.unwrap_or(1),
                });
            }
        }

        let limit = self
            .guard
            .check_rate_limit(&identifier, LimitType::Auth, RateLimitOptions::default())
            .await;
        if !limit.allowed {
            return Err(AuthError::RateLimited {
                retry_after_secs: limit.retry_after_secs.unwrap_or(1),
            });
        }

        let account = self.accounts.find_account_by_id(account_id).await?;
        if !account.active {
            return Err(AuthError::AccountInactive);
        }

        let now = self.clock.now();
        let profile = create_device_profile(meta, now);
        let assessment = self
            .detector
            .detect_suspicious_activity(account_id, &profile, self)
            .await;

        // Re-read after detection: a critical score has just bumped the
        // account's version.
        let token_version = self
            .accounts
            .find_account_by_id(account_id)
            .await?
            .token_version;

        let session_id = Uuid::new_v4();
        let binding = SessionBinding {
            account_id,
            session_id,
            role: &account.role,
            device_fingerprint: &profile.fingerprint,
            token_version,
        };
        let (access_token, access_claims) = self.signer.issue(TokenKind::Access, &binding)?;
        let (refresh_token, refresh_claims) = self.signer.issue(TokenKind::Refresh, &binding)?;

        let session = SessionRecord {
            session_id,
            account_id,
            role: account.role.clone(),
            device_fingerprint: profile.fingerprint.clone(),
            network_fingerprint: profile.network_fingerprint.clone(),
            token_version,
            created_at: now,
            last_activity: now,
            active: true,
            risk: SessionRisk {
                suspicion_score: assessment.score,
                risk_level: assessment.risk_level,
            },
            ip_address: meta.ip_address.clone(),
            user_agent: meta.user_agent.clone(),
            invalidated_at: None,
            invalidation_reason: None,
        };
        self.save_session(&session, self.session_ttl()).await?;
        bounded(
            self.keys.timeout(),
            "set_add",
            self.store.set_add(
                &self.index_key(account_id),
                &session_id.to_string(),
                self.session_ttl(),
            ),
        )
        .await?;

        if let Err(e) = self
            .devices
            .track_device_session(account_id, session_id, &profile)
            .await
        {
            warn!(account_id = %account_id, error = %e, "Device tracking failed");
        }

        // A mass invalidation that bumped the version while this session
        // was being built may have enumerated sessions before this one
        // was indexed. Such a session must not survive.
        let current = self
            .accounts
            .find_account_by_id(account_id)
            .await?
            .token_version;
        if current != token_version {
            warn!(
                account_id = %account_id,
                session_id = %session_id,
                "Token version changed during issuance, revoking new session"
            );
            self.invalidate_session(
                session_id,
                Some(account_id),
                InvalidationReason::ConcurrentRevocation,
            )
            .await?;
            return Err(AuthError::ConcurrentRevocation);
        }

        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::SessionCreated, Severity::Low)
                    .account(account_id)
                    .ip(meta.ip_address.as_deref())
                    .device(&profile.fingerprint)
                    .details(json!({
                        "session_id": session_id,
                        "risk_level": assessment.risk_level,
                        "score": assessment.score,
                        "new_device": assessment.is_new_device,
                    })),
            )
            .await;
        info!(
            account_id = %account_id,
            session_id = %session_id,
            risk_level = %assessment.risk_level,
            "Session created"
        );

        Ok(IssuedSession {
            tokens: TokenPair {
                access_token,
                refresh_token,
                session_id,
                access_expires_at: from_unix(access_claims.exp),
                refresh_expires_at: from_unix(refresh_claims.exp),
                expires_in: self.config.access_token_lifetime_secs,
            },
            session,
            assessment,
        })
    }

    // -------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------

    /// Validate an access token. With `meta`, the requesting device must
    /// match the one the session was created on.
    pub async fn validate_access_token(
        &self,
        token: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<ValidatedToken, AuthError> {
        self.validate(token, TokenKind::Access, meta).await
    }

    pub async fn validate_refresh_token(
        &self,
        token: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<ValidatedToken, AuthError> {
        self.validate(token, TokenKind::Refresh, meta).await
    }

    async fn validate(
        &self,
        token: &str,
        kind: TokenKind,
        meta: Option<&RequestMeta>,
    ) -> Result<ValidatedToken, AuthError> {
        match self.check_token(token, kind, meta).await {
            Ok(validated) => Ok(validated),
            Err(AuthError::TokenInvalid(reason)) => {
                debug!(kind = kind.as_str(), reason = reason.as_str(), "Token rejected");
                self.events
                    .record(
                        NewSecurityEvent::new(SecurityEventType::TokenRejected, Severity::Low)
                            .ip(meta.and_then(|m| m.ip_address.as_deref()))
                            .details(json!({ "kind": kind.as_str(), "reason": reason.as_str() })),
                    )
                    .await;
                Err(AuthError::TokenInvalid(reason))
            }
            Err(other) => Err(other),
        }
    }

    async fn check_token(
        &self,
        token: &str,
        kind: TokenKind,
        meta: Option<&RequestMeta>,
    ) -> Result<ValidatedToken, AuthError> {
        if self.is_blacklisted(token).await? {
            return Err(AuthError::rejected(TokenRejection::Blacklisted));
        }

        let claims = self.signer.verify(token, kind)?;
        let account_id = claims.account_id()?;
        let session_id = claims.session_id()?;

        let mut session = self
            .load_session(session_id)
            .await?
            .filter(|s| s.account_id == account_id)
            .ok_or_else(|| AuthError::rejected(TokenRejection::SessionMissing))?;
        if !session.active {
            return Err(AuthError::rejected(TokenRejection::SessionInactive));
        }
        if claims.ver != session.token_version {
            return Err(AuthError::rejected(TokenRejection::VersionMismatch));
        }
        if !constant_time_eq(claims.dfp.as_bytes(), session.device_fingerprint.as_bytes()) {
            return Err(AuthError::rejected(TokenRejection::FingerprintMismatch));
        }

        if let Some(meta) = meta {
            let presented = create_device_profile(meta, self.clock.now());
            if !constant_time_eq(presented.fingerprint.as_bytes(), claims.dfp.as_bytes()) {
                warn!(
                    account_id = %account_id,
                    session_id = %session_id,
                    "Device fingerprint mismatch on token use"
                );
                self.events
                    .record(
                        NewSecurityEvent::new(SecurityEventType::DeviceMismatch, Severity::High)
                            .account(account_id)
                            .ip(meta.ip_address.as_deref())
                            .device(&presented.fingerprint)
                            .details(json!({
                                "session_id": session_id,
                                "kind": kind.as_str(),
                                "expected_device": claims.dfp,
                            })),
                    )
                    .await;
                return Err(AuthError::rejected(TokenRejection::FingerprintMismatch));
            }
        }

        session.last_activity = self.touch(session_id).await?;
        Ok(ValidatedToken { claims, session })
    }

    /// Record activity and extend the session's lifetime. Activity lives
    /// under its own key so a touch can never overwrite a concurrent
    /// invalidation. If the session was ended meanwhile, its audit
    /// retention is restored instead of the extended lifetime.
    async fn touch(&self, session_id: Uuid) -> WardenResult<DateTime<Utc>> {
        let now = self.clock.now();
        let ttl = self.session_ttl();
        let session_key = self.session_key(session_id);
        bounded(
            self.keys.timeout(),
            "set",
            self.store.set(
                &self.activity_key(session_id),
                &now.timestamp_millis().to_string(),
                ttl,
            ),
        )
        .await?;
        bounded(
            self.keys.timeout(),
            "expire",
            self.store.expire(&session_key, ttl),
        )
        .await?;

        let ended = self
            .load_session(session_id)
            .await?
            .is_some_and(|session| !session.active);
        if ended {
            let retention = Duration::from_secs(self.config.invalidated_retention_secs);
            bounded(
                self.keys.timeout(),
                "expire",
                self.store.expire(&session_key, retention),
            )
            .await?;
            debug!(session_id = %session_id, "Touch raced an invalidation, kept retention");
        }
        Ok(now)
    }

    /// Mint a new access token for the session a refresh token belongs to.
    /// The refresh token itself stays valid.
    pub async fn refresh_access_token(
        &self,
        refresh_token: &str,
        meta: Option<&RequestMeta>,
    ) -> Result<RefreshedAccess, AuthError> {
        let validated = self.validate_refresh_token(refresh_token, meta).await?;
        let session = &validated.session;

        let (access_token, claims) = self.signer.issue(
            TokenKind::Access,
            &SessionBinding {
                account_id: session.account_id,
                session_id: session.session_id,
                role: &session.role,
                device_fingerprint: &session.device_fingerprint,
                token_version: session.token_version,
            },
        )?;
        debug!(session_id = %session.session_id, "Access token refreshed");

        Ok(RefreshedAccess {
            access_token,
            session_id: session.session_id,
            access_expires_at: from_unix(claims.exp),
            expires_in: self.config.access_token_lifetime_secs,
        })
    }

    // -------------------------------------------------------------------
    // Revocation
    // -------------------------------------------------------------------

    /// Reject `token` from now on. Without `ttl` the entry lives until the
    /// token's own expiry, but never less than the configured minimum.
    pub async fn blacklist_token(&self, token: &str, ttl: Option<Duration>) -> WardenResult<()> {
        let min = Duration::from_secs(self.config.min_blacklist_ttl_secs);
        let ttl = ttl.unwrap_or_else(|| {
            self.signer
                .peek(token)
                .map(|claims| claims.exp - self.clock.now().timestamp())
                .filter(|remaining| *remaining > 0)
                .map_or(min, |remaining| Duration::from_secs(remaining as u64).max(min))
        });

        bounded(
            self.keys.timeout(),
            "set",
            self.store.set(&self.blacklist_key(token), "1", ttl),
        )
        .await?;

        let account_id = self
            .signer
            .peek(token)
            .and_then(|claims| claims.account_id().ok());
        let mut event = NewSecurityEvent::new(SecurityEventType::TokenBlacklisted, Severity::Low)
            .details(json!({ "ttl_secs": ttl.as_secs() }));
        if let Some(account_id) = account_id {
            event = event.account(account_id);
        }
        self.events.record(event).await;
        Ok(())
    }

    pub async fn is_blacklisted(&self, token: &str) -> WardenResult<bool> {
        let entry = bounded(
            self.keys.timeout(),
            "get",
            self.store.get(&self.blacklist_key(token)),
        )
        .await?;
        Ok(entry.is_some())
    }

    /// End one session. Idempotent: returns `false` if the session is
    /// unknown, belongs to another account, or was already ended.
    pub async fn invalidate_session(
        &self,
        session_id: Uuid,
        account_id: Option<Uuid>,
        reason: InvalidationReason,
    ) -> WardenResult<bool> {
        let Some(mut session) = self.load_session(session_id).await? else {
            return Ok(false);
        };
        if account_id.is_some_and(|id| id != session.account_id) || !session.active {
            return Ok(false);
        }

        self.deactivate(&mut session, reason, false).await?;
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::SessionInvalidated, Severity::Medium)
                    .account(session.account_id)
                    .ip(session.ip_address.as_deref())
                    .device(&session.device_fingerprint)
                    .details(json!({ "session_id": session_id, "reason": reason.as_str() })),
            )
            .await;
        Ok(true)
    }

    /// End every session of an account.
    ///
    /// The account's token version is bumped first, so a session being
    /// issued concurrently either sees the new version or revokes itself.
    /// With `blacklist_tokens`, each session's own version is bumped too,
    /// so every token minted for it fails the version check.
    pub async fn invalidate_all_user_sessions(
        &self,
        account_id: Uuid,
        reason: InvalidationReason,
        blacklist_tokens: bool,
    ) -> WardenResult<InvalidationSummary> {
        let account_version = self.accounts.increment_token_version(account_id).await?;
        let mut summary = InvalidationSummary {
            account_id,
            account_token_version: Some(account_version),
            ..Default::default()
        };

        let members = bounded(
            self.keys.timeout(),
            "set_members",
            self.store.set_members(&self.index_key(account_id)),
        )
        .await?;
        summary.sessions_found = members.len();

        for member in members {
            let Ok(session_id) = Uuid::parse_str(&member) else {
                summary.failures.push(format!("malformed session id {member}"));
                continue;
            };
            match self.load_session(session_id).await {
                Ok(Some(mut session)) if session.active => {
                    match self.deactivate(&mut session, reason, blacklist_tokens).await {
                        Ok(()) => {
                            summary.sessions_invalidated += 1;
                            if blacklist_tokens {
                                summary.token_versions_bumped += 1;
                            }
                        }
                        Err(e) => summary.failures.push(format!("{session_id}: {e}")),
                    }
                }
                // Expired or already ended: drop the stale index entry.
                Ok(_) => {
                    if let Err(e) = self.unindex(account_id, session_id).await {
                        summary.failures.push(format!("{session_id}: {e}"));
                    }
                }
                Err(e) => summary.failures.push(format!("{session_id}: {e}")),
            }
        }

        warn!(
            account_id = %account_id,
            reason = reason.as_str(),
            sessions_invalidated = summary.sessions_invalidated,
            account_token_version = account_version,
            "All sessions invalidated"
        );
        self.events
            .record(
                NewSecurityEvent::new(SecurityEventType::AllSessionsInvalidated, Severity::High)
                    .account(account_id)
                    .details(json!({
                        "reason": reason.as_str(),
                        "sessions_found": summary.sessions_found,
                        "sessions_invalidated": summary.sessions_invalidated,
                        "token_versions_bumped": summary.token_versions_bumped,
                        "account_token_version": account_version,
                        "failures": summary.failures.len(),
                    })),
            )
            .await;
        Ok(summary)
    }

    /// Invalidate all sessions of several accounts. One account failing
    /// does not stop the others.
    pub async fn bulk_invalidate_sessions(
        &self,
        account_ids: &[Uuid],
        reason: InvalidationReason,
        blacklist_tokens: bool,
    ) -> BulkInvalidationResult {
        let mut result = BulkInvalidationResult::default();
        for &account_id in account_ids {
            match self
                .invalidate_all_user_sessions(account_id, reason, blacklist_tokens)
                .await
            {
                Ok(summary) => {
                    result.accounts_succeeded += 1;
                    result.total_sessions_invalidated += summary.sessions_invalidated;
                    result.items.push(BulkInvalidationItem {
                        account_id,
                        summary: Some(summary),
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(account_id = %account_id, error = %e, "Bulk invalidation failed for account");
                    result.accounts_failed += 1;
                    result.items.push(BulkInvalidationItem {
                        account_id,
                        summary: None,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        result.success = result.accounts_failed == 0;
        info!(
            accounts = account_ids.len(),
            failed = result.accounts_failed,
            sessions = result.total_sessions_invalidated,
            "Bulk invalidation finished"
        );
        result
    }

    /// End the session an access token belongs to and blacklist the token.
    pub async fn logout(&self, access_token: &str) -> Result<bool, AuthError> {
        let validated = self.validate_access_token(access_token, None).await?;
        self.blacklist_token(access_token, None).await?;
        Ok(self
            .invalidate_session(
                validated.session.session_id,
                Some(validated.session.account_id),
                InvalidationReason::Logout,
            )
            .await?)
    }

    // -------------------------------------------------------------------
    // Administration
    // -------------------------------------------------------------------

    pub async fn get_session(&self, session_id: Uuid) -> WardenResult<Option<SessionRecord>> {
        self.load_session(session_id).await
    }

    /// Active sessions of an account, oldest first.
    pub async fn list_user_sessions(&self, account_id: Uuid) -> WardenResult<Vec<SessionRecord>> {
        let members = bounded(
            self.keys.timeout(),
            "set_members",
            self.store.set_members(&self.index_key(account_id)),
        )
        .await?;
        let mut sessions = Vec::with_capacity(members.len());
        for member in members {
            let Ok(session_id) = Uuid::parse_str(&member) else {
                continue;
            };
            if let Some(session) = self.load_session(session_id).await? {
                if session.active && session.account_id == account_id {
                    sessions.push(session);
                }
            }
        }
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(sessions)
    }

    pub async fn get_device_history(&self, account_id: Uuid) -> WardenResult<Vec<DeviceRecord>> {
        self.devices.history(account_id).await
    }

    // -------------------------------------------------------------------
    // Session records
    // -------------------------------------------------------------------

    async fn load_session(&self, session_id: Uuid) -> WardenResult<Option<SessionRecord>> {
        let raw = bounded(
            self.keys.timeout(),
            "get",
            self.store.get(&self.session_key(session_id)),
        )
        .await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let mut session: SessionRecord = serde_json::from_str(&raw)?;

        let activity = bounded(
            self.keys.timeout(),
            "get",
            self.store.get(&self.activity_key(session_id)),
        )
        .await?;
        if let Some(millis) = activity.and_then(|v| v.parse::<i64>().ok()) {
            if let Some(at) = DateTime::from_timestamp_millis(millis) {
                session.last_activity = session.last_activity.max(at);
            }
        }
        Ok(Some(session))
    }

    async fn save_session(&self, session: &SessionRecord, ttl: Duration) -> WardenResult<()> {
        let payload = serde_json::to_string(session)?;
        bounded(
            self.keys.timeout(),
            "set",
            self.store.set(&self.session_key(session.session_id), &payload, ttl),
        )
        .await
    }

    async fn unindex(&self, account_id: Uuid, session_id: Uuid) -> WardenResult<()> {
        bounded(
            self.keys.timeout(),
            "set_remove",
            self.store
                .set_remove(&self.index_key(account_id), &session_id.to_string()),
        )
        .await
    }

    /// Mark a session ended and keep it for the audit window.
    async fn deactivate(
        &self,
        session: &mut SessionRecord,
        reason: InvalidationReason,
        bump_version: bool,
    ) -> WardenResult<()> {
        session.active = false;
        session.invalidated_at = Some(self.clock.now());
        session.invalidation_reason = Some(reason);
        if bump_version {
            session.token_version += 1;
        }
        self.save_session(
            session,
            Duration::from_secs(self.config.invalidated_retention_secs),
        )
        .await?;
        self.unindex(session.account_id, session.session_id).await?;

        if let Err(e) = self
            .devices
            .invalidate_device_session(
                session.account_id,
                &session.device_fingerprint,
                session.session_id,
            )
            .await
        {
            warn!(session_id = %session.session_id, error = %e, "Device session cleanup failed");
        }
        debug!(
            session_id = %session.session_id,
            account_id = %session.account_id,
            reason = reason.as_str(),
            "Session invalidated"
        );
        Ok(())
    }
}

impl<S, A, E> SessionInvalidator for SessionManager<S, A, E>
where
    S: KeyedStore + Clone,
    A: AccountStore,
    E: EventSink + Clone,
{
    async fn invalidate_all_user_sessions(
        &self,
        account_id: Uuid,
        reason: InvalidationReason,
        blacklist_tokens: bool,
    ) -> WardenResult<InvalidationSummary> {
        SessionManager::invalidate_all_user_sessions(self, account_id, reason, blacklist_tokens).await
    }
}
