//! Salted password hashing with Argon2id.
//!
//! Parameters follow OWASP ASVS (memory: 19 MiB, iterations: 2,
//! parallelism: 1). An optional pepper (server-side secret) is prepended
//! to the password before hashing and verification.

use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHasher, PasswordVerifier};

use crate::error::CryptoError;

fn argon2() -> Result<Argon2<'static>, CryptoError> {
    let params = argon2::Params::new(19456, 2, 1, None)
        .map_err(|e| CryptoError::PasswordHash(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        params,
    ))
}

fn peppered(password: &str, pepper: Option<&str>) -> Vec<u8> {
    match pepper {
        Some(p) => format!("{p}{password}").into_bytes(),
        None => password.as_bytes().to_vec(),
    }
}

/// Hash a password into PHC string format with a random salt.
pub fn hash_password(password: &str, pepper: Option<&str>) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut argon2::password_hash::rand_core::OsRng);
    let hash = argon2()?
        .hash_password(&peppered(password, pepper), &salt)
        .map_err(|e| CryptoError::PasswordHash(format!("hash: {e}")))?;
    Ok(hash.to_string())
}

/// Verify a plaintext password against a PHC-format hash. The digest
/// comparison inside Argon2 is constant-time.
///
/// Returns `Ok(false)` on mismatch and an error only if the stored hash
/// is malformed.
pub fn verify_password(password: &str, hash: &str, pepper: Option<&str>) -> Result<bool, CryptoError> {
    let parsed = argon2::PasswordHash::new(hash)
        .map_err(|e| CryptoError::PasswordHash(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(&peppered(password, pepper), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(CryptoError::PasswordHash(format!("verify: {e}"))),
    }
}
