//! Cryptography error types.

use thiserror::Error;
use warden_core::error::WardenError;

#[derive(Debug, Error)]
pub enum CryptoError {
    /// The value carries no envelope prefix. Distinct from corruption so
    /// callers can tell "nothing to decrypt" from "bad ciphertext".
    #[error("value is not encrypted")]
    NotEncrypted,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("envelope is for field type {found}, expected {expected}")]
    FieldTypeMismatch { expected: String, found: String },

    #[error("decryption failed: authentication tag mismatch")]
    Decryption,

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<CryptoError> for WardenError {
    fn from(err: CryptoError) -> Self {
        WardenError::Crypto(err.to_string())
    }
}
