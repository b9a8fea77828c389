//! Session and token error types.
//!
//! [`AuthError`] keeps the precise reason a token was refused so it can be
//! logged and recorded. The conversion into [`WardenError`] collapses
//! every refusal into the single opaque `TOKEN_INVALID` code.

use thiserror::Error;
use warden_core::error::WardenError;

/// Why a token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    Blacklisted,
    BadSignature,
    WrongKind,
    SessionInactive,
    SessionMissing,
    VersionMismatch,
    FingerprintMismatch,
    Malformed,
}

impl TokenRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Blacklisted => "blacklisted",
            Self::BadSignature => "bad_signature",
            Self::WrongKind => "wrong_kind",
            Self::SessionInactive => "session_inactive",
            Self::SessionMissing => "session_missing",
            Self::VersionMismatch => "version_mismatch",
            Self::FingerprintMismatch => "fingerprint_mismatch",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token has expired")]
    TokenExpired,

    #[error("invalid token: {0}")]
    TokenInvalid(TokenRejection),

    #[error("account is inactive")]
    AccountInactive,

    #[error("too many attempts, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("session was revoked while it was being issued")]
    ConcurrentRevocation,

    #[error("cryptography error: {0}")]
    Crypto(String),

    #[error(transparent)]
    Core(#[from] WardenError),
}

impl AuthError {
    pub fn rejected(reason: TokenRejection) -> Self {
        Self::TokenInvalid(reason)
    }
}

impl From<AuthError> for WardenError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired => WardenError::TokenExpired,
            AuthError::TokenInvalid(_) => WardenError::TokenInvalid,
            AuthError::AccountInactive | AuthError::ConcurrentRevocation => {
                WardenError::AuthenticationFailed {
                    reason: err.to_string(),
                }
            }
            AuthError::RateLimited { retry_after_secs } => {
                WardenError::RateLimited { retry_after_secs }
            }
            AuthError::Crypto(msg) => WardenError::Crypto(msg),
            AuthError::Core(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_rejection_collapses_to_one_code() {
        for reason in [
            TokenRejection::Blacklisted,
            TokenRejection::BadSignature,
            TokenRejection::WrongKind,
            TokenRejection::SessionInactive,
            TokenRejection::SessionMissing,
            TokenRejection::VersionMismatch,
            TokenRejection::FingerprintMismatch,
            TokenRejection::Malformed,
        ] {
            let err: WardenError = AuthError::rejected(reason).into();
            assert_eq!(err.code(), "TOKEN_INVALID");
            assert!(!err.to_string().contains(reason.as_str()));
        }
    }

    #[test]
    fn expiry_keeps_its_own_code() {
        let err: WardenError = AuthError::TokenExpired.into();
        assert_eq!(err.code(), "TOKEN_EXPIRED");
    }

    #[test]
    fn infrastructure_errors_pass_through() {
        let err: WardenError = AuthError::Core(WardenError::Store("down".into())).into();
        assert!(err.is_infrastructure());
    }
}
