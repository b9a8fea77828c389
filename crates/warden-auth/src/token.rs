//! Signed access and refresh tokens (HS256 JWT).
//!
//! Both kinds carry the same claim set; each kind has its own secret.
//! Expiry is checked against the injected [`Clock`] rather than the
//! library's wall-clock check so that issuance and validation agree on
//! what "now" is.

use std::sync::Arc;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;
use warden_core::clock::Clock;

use crate::config::AuthConfig;
use crate::error::{AuthError, TokenRejection};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

/// JWT claims embedded in every token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Subject — account ID (UUID string).
    pub sub: String,
    /// Session ID (UUID string).
    pub sid: String,
    /// Account role. Access tokens only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Device fingerprint the session is bound to.
    pub dfp: String,
    /// Token version at issuance.
    pub ver: u64,
    pub kind: TokenKind,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    /// Unique token ID (UUID string).
    pub jti: String,
}

impl TokenClaims {
    pub fn account_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::rejected(TokenRejection::Malformed))
    }

    pub fn session_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sid).map_err(|_| AuthError::rejected(TokenRejection::Malformed))
    }
}

/// What a token is bound to.
#[derive(Debug, Clone)]
pub struct SessionBinding<'a> {
    pub account_id: Uuid,
    pub session_id: Uuid,
    pub role: &'a str,
    pub device_fingerprint: &'a str,
    pub token_version: u64,
}

/// Issues and verifies tokens of both kinds.
#[derive(Clone)]
pub struct TokenSigner {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    audience: String,
    access_lifetime_secs: i64,
    refresh_lifetime_secs: i64,
    clock: Arc<dyn Clock>,
}

impl TokenSigner {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        if config.access_token_secret.is_empty() || config.refresh_token_secret.is_empty() {
            return Err(AuthError::Crypto("token secrets must not be empty".into()));
        }
        Ok(Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            issuer: config.jwt_issuer.clone(),
            audience: config.jwt_audience.clone(),
            access_lifetime_secs: config.access_token_lifetime_secs as i64,
            refresh_lifetime_secs: config.refresh_token_lifetime_secs as i64,
            clock,
        })
    }

    /// Issue a signed token of `kind` bound to `binding`.
    pub fn issue(
        &self,
        kind: TokenKind,
        binding: &SessionBinding<'_>,
    ) -> Result<(String, TokenClaims), AuthError> {
        let now = self.clock.now().timestamp();
        let (key, lifetime, role) = match kind {
            TokenKind::Access => (
                &self.access_encoding,
                self.access_lifetime_secs,
                Some(binding.role.to_string()),
            ),
            TokenKind::Refresh => (&self.refresh_encoding, self.refresh_lifetime_secs, None),
        };
        let claims = TokenClaims {
            sub: binding.account_id.to_string(),
            sid: binding.session_id.to_string(),
            role,
            dfp: binding.device_fingerprint.to_string(),
            ver: binding.token_version,
            kind,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + lifetime,
            jti: Uuid::new_v4().to_string(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, key)
            .map_err(|e| AuthError::Crypto(format!("JWT encode: {e}")))?;
        Ok((token, claims))
    }

    /// Verify signature, issuer, audience, expiry and kind.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<TokenClaims, AuthError> {
        let key = match kind {
            TokenKind::Access => &self.access_decoding,
            TokenKind::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["sub", "exp", "iat", "iss", "aud"]);
        validation.validate_exp = false;

        let claims = jsonwebtoken::decode::<TokenClaims>(token, key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                AuthError::rejected(match e.kind() {
                    ErrorKind::InvalidSignature
                    | ErrorKind::InvalidIssuer
                    | ErrorKind::InvalidAudience
                    | ErrorKind::InvalidAlgorithm => TokenRejection::BadSignature,
                    _ => TokenRejection::Malformed,
                })
            })?;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(AuthError::TokenExpired);
        }
        if claims.kind != kind {
            return Err(AuthError::rejected(TokenRejection::WrongKind));
        }
        Ok(claims)
    }

    /// Read claims without verifying anything. Only for deciding how long
    /// a blacklist entry must live.
    pub fn peek(&self, token: &str) -> Option<TokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        jsonwebtoken::decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)
            .ok()
            .map(|data| data.claims)
    }
}

/// SHA-256 of a raw token, hex-encoded. Blacklist entries are keyed by
/// this so raw tokens never reach the store.
pub fn token_hash(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}
