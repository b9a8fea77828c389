//! Low-level primitives: PBKDF2 key derivation, AES-256-GCM sealing,
//! HMAC-SHA256, constant-time comparison, and CSPRNG-backed tokens.

use aes_gcm::aead::rand_core::RngCore;
use aes_gcm::aead::{Aead, KeyInit, OsRng, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::Rng;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Derive a 256-bit key with PBKDF2-HMAC-SHA256.
pub fn derive_key(secret: &[u8], salt: &[u8], iterations: u32) -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, iterations, &mut key);
    key
}

/// Output of [`seal`]: a fresh IV, the detached tag, and the ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub iv: [u8; IV_LEN],
    pub tag: [u8; TAG_LEN],
    pub ciphertext: Vec<u8>,
}

/// Encrypt with AES-256-GCM under a freshly generated 96-bit IV.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Sealed, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);

    let mut combined = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::Encryption(format!("AES-GCM encrypt: {e}")))?;

    // aes-gcm appends the tag to the ciphertext.
    let tag_start = combined.len() - TAG_LEN;
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&combined[tag_start..]);
    combined.truncate(tag_start);

    Ok(Sealed {
        iv,
        tag,
        ciphertext: combined,
    })
}

/// Decrypt and authenticate an AES-256-GCM payload.
pub fn open(key: &[u8; KEY_LEN], sealed: &Sealed, aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut combined = Vec::with_capacity(sealed.ciphertext.len() + TAG_LEN);
    combined.extend_from_slice(&sealed.ciphertext);
    combined.extend_from_slice(&sealed.tag);

    cipher
        .decrypt(
            Nonce::from_slice(&sealed.iv),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption)
}

pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32], CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::KeyDerivation(format!("HMAC key: {e}")))?;
    mac.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(&mac.finalize().into_bytes());
    Ok(out)
}

/// Verify an HMAC-SHA256 tag in constant time.
pub fn verify_hmac_sha256(key: &[u8], data: &[u8], expected: &[u8]) -> bool {
    match <HmacSha256 as Mac>::new_from_slice(key) {
        Ok(mut mac) => {
            mac.update(data);
            mac.verify_slice(expected).is_ok()
        }
        Err(_) => false,
    }
}

/// Constant-time equality. Unequal lengths return false immediately.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && bool::from(a.ct_eq(b))
}

/// `n` random bytes, base64url-encoded without padding.
pub fn generate_secure_token(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Random alphanumeric string of length `len` (backup codes, API key ids).
pub fn generate_secure_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| ALPHANUMERIC[rng.random_range(0..ALPHANUMERIC.len())] as char)
        .collect()
}

/// SHA-256 digest, hex-encoded.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = [7u8; KEY_LEN];
        let sealed = seal(&key, b"booking@example.com", b"aad").unwrap();
        assert_eq!(open(&key, &sealed, b"aad").unwrap(), b"booking@example.com");
    }

    #[test]
    fn every_seal_uses_a_fresh_iv() {
        let key = [7u8; KEY_LEN];
        let a = seal(&key, b"same", b"").unwrap();
        let b = seal(&key, b"same", b"").unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_aad_fails_authentication() {
        let key = [7u8; KEY_LEN];
        let sealed = seal(&key, b"secret", b"email").unwrap();
        assert!(matches!(
            open(&key, &sealed, b"phone"),
            Err(CryptoError::Decryption)
        ));
    }

    #[test]
    fn tampered_tag_fails_authentication() {
        let key = [7u8; KEY_LEN];
        let mut sealed = seal(&key, b"secret", b"").unwrap();
        sealed.tag[0] ^= 0xff;
        assert!(open(&key, &sealed, b"").is_err());
    }

    #[test]
    fn derive_key_depends_on_salt() {
        let a = derive_key(b"secret", b"salt-a", 1_000);
        let b = derive_key(b"secret", b"salt-b", 1_000);
        assert_ne!(a, b);
        assert_eq!(a, derive_key(b"secret", b"salt-a", 1_000));
    }

    #[test]
    fn hmac_verification() {
        let tag = hmac_sha256(b"key", b"bundle").unwrap();
        assert!(verify_hmac_sha256(b"key", b"bundle", &tag));
        assert!(!verify_hmac_sha256(b"key", b"bundle!", &tag));
        assert!(!verify_hmac_sha256(b"other", b"bundle", &tag));
    }

    #[test]
    fn constant_time_eq_handles_lengths() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"abcd"));
    }

    #[test]
    fn secure_token_is_url_safe() {
        let token = generate_secure_token(32);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        // 32 bytes → 43 base64url chars.
        assert_eq!(token.len(), 43);
    }

    #[test]
    fn secure_string_is_alphanumeric() {
        let s = generate_secure_string(24);
        assert_eq!(s.len(), 24);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
