//! Field encryption service.
//!
//! A master key is derived once from the configured secret; every
//! [`FieldType`] then gets its own sub-key derived from the master key
//! with a type-specific salt, so compromising one class of field exposes
//! no other.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::envelope::FieldEnvelope;
use crate::error::CryptoError;
use crate::primitives::{self, KEY_LEN};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Email,
    Phone,
    Address,
    Token,
    BackupCode,
    ApiSecret,
    PersonalData,
}

impl FieldType {
    pub const ALL: [FieldType; 7] = [
        FieldType::Email,
        FieldType::Phone,
        FieldType::Address,
        FieldType::Token,
        FieldType::BackupCode,
        FieldType::ApiSecret,
        FieldType::PersonalData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Phone => "phone",
            Self::Address => "address",
            Self::Token => "token",
            Self::BackupCode => "backup_code",
            Self::ApiSecret => "api_secret",
            Self::PersonalData => "personal_data",
        }
    }

    fn key_salt(&self) -> String {
        format!("warden-field-key:{}", self.as_str())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CryptoError::MalformedEnvelope(format!("unknown field type {s}")))
    }
}

/// Configuration for the field encryption service.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct FieldEncryptionConfig {
    /// Secret the master key is derived from. Must be non-empty.
    pub master_secret: String,
    /// Fixed application-level salt for the master key.
    pub application_salt: String,
    /// PBKDF2 iterations for the master key (default: 100_000).
    pub kdf_iterations: u32,
    /// PBKDF2 iterations for each per-field-type sub-key (default: 10_000).
    pub subkey_iterations: u32,
}

impl Default for FieldEncryptionConfig {
    fn default() -> Self {
        Self {
            master_secret: String::new(),
            application_salt: "warden-field-encryption-v1".into(),
            kdf_iterations: 100_000,
            subkey_iterations: 10_000,
        }
    }
}

impl fmt::Debug for FieldEncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldEncryptionConfig")
            .field("master_secret", &"<redacted>")
            .field("application_salt", &self.application_salt)
            .field("kdf_iterations", &self.kdf_iterations)
            .field("subkey_iterations", &self.subkey_iterations)
            .finish()
    }
}

pub struct FieldEncryptionService {
    field_keys: HashMap<FieldType, [u8; KEY_LEN]>,
    integrity_key: [u8; KEY_LEN],
}

impl FieldEncryptionService {
    /// Derive the master key and every sub-key. Runs the slow KDF, so
    /// construct once at startup.
    pub fn new(config: &FieldEncryptionConfig) -> Result<Self, CryptoError> {
        if config.master_secret.is_empty() {
            return Err(CryptoError::KeyDerivation("master secret is empty".into()));
        }
        if config.kdf_iterations == 0 || config.subkey_iterations == 0 {
            return Err(CryptoError::KeyDerivation(
                "iteration counts must be positive".into(),
            ));
        }

        let master = primitives::derive_key(
            config.master_secret.as_bytes(),
            config.application_salt.as_bytes(),
            config.kdf_iterations,
        );

        let field_keys = FieldType::ALL
            .into_iter()
            .map(|t| {
                let key = primitives::derive_key(
                    &master,
                    t.key_salt().as_bytes(),
                    config.subkey_iterations,
                );
                (t, key)
            })
            .collect();

        let integrity_key =
            primitives::derive_key(&master, b"warden-integrity", config.subkey_iterations);

        debug!(
            field_types = FieldType::ALL.len(),
            "Derived field encryption keys"
        );

        Ok(Self {
            field_keys,
            integrity_key,
        })
    }

    fn key_for(&self, field_type: FieldType) -> &[u8; KEY_LEN] {
        // Every FieldType gets a key in `new`.
        &self.field_keys[&field_type]
    }

    pub fn is_encrypted(value: &str) -> bool {
        FieldEnvelope::is_encrypted(value)
    }

    pub fn encrypt_field(&self, value: &str, field_type: FieldType) -> Result<String, CryptoError> {
        let sealed = primitives::seal(
            self.key_for(field_type),
            value.as_bytes(),
            &FieldEnvelope::aad(field_type),
        )?;
        Ok(FieldEnvelope {
            field_type,
            sealed,
            created_at_ms: Utc::now().timestamp_millis(),
        }
        .encode())
    }

    /// Decrypt an envelope. Fails with [`CryptoError::NotEncrypted`] for
    /// plain values and [`CryptoError::FieldTypeMismatch`] when the
    /// envelope declares a different field type.
    pub fn decrypt_field(&self, value: &str, field_type: FieldType) -> Result<String, CryptoError> {
        let envelope = FieldEnvelope::parse(value)?;
        if envelope.field_type != field_type {
            return Err(CryptoError::FieldTypeMismatch {
                expected: field_type.to_string(),
                found: envelope.field_type.to_string(),
            });
        }

        let plaintext = primitives::open(
            self.key_for(envelope.field_type),
            &envelope.sealed,
            &FieldEnvelope::aad(envelope.field_type),
        )?;
        String::from_utf8(plaintext)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("plaintext is not UTF-8: {e}")))
    }

    /// Decrypt with this service's keys and re-encrypt under `target`'s.
    pub fn reencrypt(
        &self,
        value: &str,
        field_type: FieldType,
        target: &FieldEncryptionService,
    ) -> Result<String, CryptoError> {
        let plaintext = self.decrypt_field(value, field_type)?;
        target.encrypt_field(&plaintext, field_type)
    }

    /// HMAC-SHA256 over the JSON encoding of `data`, hex-encoded.
    pub fn sign_data<T: Serialize>(&self, data: &T) -> Result<String, CryptoError> {
        let bytes = serde_json::to_vec(data)?;
        Ok(hex::encode(primitives::hmac_sha256(
            &self.integrity_key,
            &bytes,
        )?))
    }

    /// Constant-time verification of a signature from [`Self::sign_data`].
    pub fn verify_signature<T: Serialize>(&self, data: &T, signature: &str) -> bool {
        let Ok(expected) = hex::decode(signature) else {
            return false;
        };
        let Ok(bytes) = serde_json::to_vec(data) else {
            return false;
        };
        primitives::verify_hmac_sha256(&self.integrity_key, &bytes, &expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(secret: &str) -> FieldEncryptionConfig {
        FieldEncryptionConfig {
            master_secret: secret.into(),
            kdf_iterations: 1_000,
            subkey_iterations: 100,
            ..Default::default()
        }
    }

    #[test]
    fn roundtrip_each_field_type() {
        let svc = FieldEncryptionService::new(&test_config("s3cret")).unwrap();
        for t in FieldType::ALL {
            let enc = svc.encrypt_field("value-ü", t).unwrap();
            assert!(FieldEncryptionService::is_encrypted(&enc));
            assert_eq!(svc.decrypt_field(&enc, t).unwrap(), "value-ü");
        }
    }

    #[test]
    fn empty_string_roundtrips() {
        let svc = FieldEncryptionService::new(&test_config("s3cret")).unwrap();
        let enc = svc.encrypt_field("", FieldType::Token).unwrap();
        assert_eq!(svc.decrypt_field(&enc, FieldType::Token).unwrap(), "");
    }

    #[test]
    fn decrypt_with_other_field_type_is_rejected() {
        let svc = FieldEncryptionService::new(&test_config("s3cret")).unwrap();
        let enc = svc.encrypt_field("+44 20 7946 0000", FieldType::Phone).unwrap();
        assert!(matches!(
            svc.decrypt_field(&enc, FieldType::Email),
            Err(CryptoError::FieldTypeMismatch { .. })
        ));
    }

    #[test]
    fn relabelled_envelope_fails_tag_check() {
        let svc = FieldEncryptionService::new(&test_config("s3cret")).unwrap();
        let enc = svc.encrypt_field("secret", FieldType::Phone).unwrap();
        let relabelled = enc.replacen("$phone$", "$email$", 1);
        assert!(matches!(
            svc.decrypt_field(&relabelled, FieldType::Email),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn plain_value_is_not_encrypted_error() {
        let svc = FieldEncryptionService::new(&test_config("s3cret")).unwrap();
        assert!(matches!(
            svc.decrypt_field("alice@example.com", FieldType::Email),
            Err(CryptoError::NotEncrypted)
        ));
    }

    #[test]
    fn other_master_secret_cannot_decrypt() {
        let a = FieldEncryptionService::new(&test_config("secret-a")).unwrap();
        let b = FieldEncryptionService::new(&test_config("secret-b")).unwrap();
        let enc = a.encrypt_field("x", FieldType::Email).unwrap();
        assert!(matches!(
            b.decrypt_field(&enc, FieldType::Email),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn reencrypt_moves_value_to_new_keys() {
        let old = FieldEncryptionService::new(&test_config("old")).unwrap();
        let new = FieldEncryptionService::new(&test_config("new")).unwrap();
        let enc = old.encrypt_field("rotate me", FieldType::ApiSecret).unwrap();
        let rotated = old.reencrypt(&enc, FieldType::ApiSecret, &new).unwrap();
        assert_eq!(
            new.decrypt_field(&rotated, FieldType::ApiSecret).unwrap(),
            "rotate me"
        );
        assert!(old.decrypt_field(&rotated, FieldType::ApiSecret).is_err());
    }

    #[test]
    fn empty_master_secret_is_rejected() {
        assert!(matches!(
            FieldEncryptionService::new(&test_config("")),
            Err(CryptoError::KeyDerivation(_))
        ));
    }

    #[test]
    fn signatures_detect_tampering() {
        let svc = FieldEncryptionService::new(&test_config("s3cret")).unwrap();
        let bundle = serde_json::json!({"account": "a1", "bookings": [1, 2, 3]});
        let sig = svc.sign_data(&bundle).unwrap();
        assert!(svc.verify_signature(&bundle, &sig));

        let tampered = serde_json::json!({"account": "a1", "bookings": [1, 2, 4]});
        assert!(!svc.verify_signature(&tampered, &sig));
        assert!(!svc.verify_signature(&bundle, "not-hex"));
    }

    #[test]
    fn debug_redacts_master_secret() {
        let rendered = format!("{:?}", test_config("hunter2"));
        assert!(!rendered.contains("hunter2"));
    }
}
