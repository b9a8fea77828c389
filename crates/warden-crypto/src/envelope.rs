//! Self-describing ciphertext stored in place of a plaintext field.
//!
//! Wire form:
//! `$wenc$v1$aes-256-gcm$<field_type>$<iv>$<tag>$<ciphertext>$<created_ms>`
//! with base64url (no padding) binary parts. The fixed prefix makes
//! [`FieldEnvelope::is_encrypted`] a constant-time prefix check.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;

use crate::error::CryptoError;
use crate::field::FieldType;
use crate::primitives::{IV_LEN, Sealed, TAG_LEN};

pub const ENVELOPE_PREFIX: &str = "$wenc$v1$";
pub const ALGORITHM: &str = "aes-256-gcm";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldEnvelope {
    pub field_type: FieldType,
    pub sealed: Sealed,
    /// Unix timestamp (milliseconds) of encryption.
    pub created_at_ms: i64,
}

impl FieldEnvelope {
    /// Never fails; only inspects the prefix.
    pub fn is_encrypted(value: &str) -> bool {
        value.starts_with(ENVELOPE_PREFIX)
    }

    /// Additional authenticated data binding the ciphertext to its
    /// declared field type.
    pub fn aad(field_type: FieldType) -> Vec<u8> {
        format!("{ENVELOPE_PREFIX}{ALGORITHM}${}", field_type.as_str()).into_bytes()
    }

    pub fn encode(&self) -> String {
        format!(
            "{ENVELOPE_PREFIX}{ALGORITHM}${}${}${}${}${}",
            self.field_type.as_str(),
            URL_SAFE_NO_PAD.encode(self.sealed.iv),
            URL_SAFE_NO_PAD.encode(self.sealed.tag),
            URL_SAFE_NO_PAD.encode(&self.sealed.ciphertext),
            self.created_at_ms,
        )
    }

    pub fn parse(value: &str) -> Result<Self, CryptoError> {
        let body = value
            .strip_prefix(ENVELOPE_PREFIX)
            .ok_or(CryptoError::NotEncrypted)?;

        let parts: Vec<&str> = body.split('$').collect();
        let [algorithm, field_type, iv, tag, ciphertext, created] = parts.as_slice() else {
            return Err(CryptoError::MalformedEnvelope(format!(
                "expected 6 segments, found {}",
                parts.len()
            )));
        };

        if *algorithm != ALGORITHM {
            return Err(CryptoError::MalformedEnvelope(format!(
                "unsupported algorithm {algorithm}"
            )));
        }

        let field_type: FieldType = field_type.parse()?;
        let iv = decode_fixed::<IV_LEN>(iv, "iv")?;
        let tag = decode_fixed::<TAG_LEN>(tag, "tag")?;
        let ciphertext = URL_SAFE_NO_PAD
            .decode(ciphertext)
            .map_err(|e| CryptoError::MalformedEnvelope(format!("ciphertext: {e}")))?;
        let created_at_ms = created
            .parse::<i64>()
            .map_err(|e| CryptoError::MalformedEnvelope(format!("timestamp: {e}")))?;

        Ok(Self {
            field_type,
            sealed: Sealed {
                iv,
                tag,
                ciphertext,
            },
            created_at_ms,
        })
    }
}

fn decode_fixed<const N: usize>(segment: &str, name: &str) -> Result<[u8; N], CryptoError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| CryptoError::MalformedEnvelope(format!("{name}: {e}")))?;
    bytes.try_into().map_err(|b: Vec<u8>| {
        CryptoError::MalformedEnvelope(format!("{name}: expected {N} bytes, got {}", b.len()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FieldEnvelope {
        FieldEnvelope {
            field_type: FieldType::Phone,
            sealed: Sealed {
                iv: [1u8; IV_LEN],
                tag: [2u8; TAG_LEN],
                ciphertext: vec![3, 4, 5],
            },
            created_at_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn encode_parse_roundtrip() {
        let env = sample();
        let encoded = env.encode();
        assert!(FieldEnvelope::is_encrypted(&encoded));
        assert_eq!(FieldEnvelope::parse(&encoded).unwrap(), env);
    }

    #[test]
    fn plain_values_are_not_envelopes() {
        for plain in ["", "alice@example.com", "$wenc", "$2b$12$abcdef", "wenc$v1$"] {
            assert!(!FieldEnvelope::is_encrypted(plain), "{plain}");
            assert!(matches!(
                FieldEnvelope::parse(plain),
                Err(CryptoError::NotEncrypted)
            ));
        }
    }

    #[test]
    fn truncated_envelope_is_malformed() {
        let encoded = sample().encode();
        let truncated = &encoded[..encoded.rfind('$').unwrap()];
        assert!(matches!(
            FieldEnvelope::parse(truncated),
            Err(CryptoError::MalformedEnvelope(_))
        ));
    }

    #[test]
    fn bad_iv_length_is_malformed() {
        let encoded = sample()
            .encode()
            .replacen(&URL_SAFE_NO_PAD.encode([1u8; IV_LEN]), "AQID", 1);
        assert!(matches!(
            FieldEnvelope::parse(&encoded),
            Err(CryptoError::MalformedEnvelope(msg)) if msg.starts_with("iv")
        ));
    }
}
