//! Encrypt-before-write / decrypt-after-read over JSON records.
//!
//! Whether a decryption failure aborts the read or hands back the
//! ciphertext is the caller's decision, passed in as a [`DecryptPolicy`]
//! at every call site.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::envelope::FieldEnvelope;
use crate::error::CryptoError;
use crate::field::{FieldEncryptionService, FieldType};
use crate::mapping::{FieldMapping, FieldPath, RecordType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptPolicy {
    /// Any decryption failure fails the whole read (primary read path).
    Strict,
    /// Leave undecryptable values as ciphertext and report them (audit
    /// path).
    PassThroughOnError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptReport {
    pub decrypted: usize,
    /// Paths left as ciphertext under [`DecryptPolicy::PassThroughOnError`].
    pub passed_through: Vec<String>,
}

/// Apply `f` to every string leaf `path` resolves to. Absent and null
/// values are skipped.
fn visit_leaves(
    record: &mut Value,
    path: &FieldPath,
    f: &mut dyn FnMut(&mut String) -> Result<(), CryptoError>,
) -> Result<(), CryptoError> {
    match path {
        FieldPath::Scalar(name) => {
            if let Some(Value::String(s)) = record.get_mut(*name) {
                f(s)?;
            }
        }
        FieldPath::Nested(segments) => {
            let mut current = record;
            for segment in segments.iter() {
                current = match current.get_mut(*segment) {
                    Some(next) => next,
                    None => return Ok(()),
                };
            }
            if let Value::String(s) = current {
                f(s)?;
            }
        }
        FieldPath::ArrayOfScalar(name) => {
            if let Some(Value::Array(items)) = record.get_mut(*name) {
                for item in items.iter_mut() {
                    if let Value::String(s) = item {
                        f(s)?;
                    }
                }
            }
        }
        FieldPath::ArrayOfObjectField { array, field } => {
            if let Some(Value::Array(items)) = record.get_mut(*array) {
                for item in items.iter_mut() {
                    if let Some(Value::String(s)) = item.get_mut(*field) {
                        f(s)?;
                    }
                }
            }
        }
    }
    Ok(())
}

impl FieldEncryptionService {
    /// Encrypt every mapped field in place. Values that already parse as
    /// an envelope of the mapped field type are left alone, so re-saving
    /// a record is idempotent. Anything else, including plaintext that
    /// merely starts with the envelope prefix, is encrypted.
    /// Returns the number of values encrypted.
    pub fn encrypt_fields(
        &self,
        record: &mut Value,
        mappings: &[FieldMapping],
    ) -> Result<usize, CryptoError> {
        let mut encrypted = 0;
        for mapping in mappings {
            visit_leaves(record, &mapping.path, &mut |s| {
                let sealed = FieldEnvelope::parse(s)
                    .is_ok_and(|envelope| envelope.field_type == mapping.field_type);
                if !sealed {
                    *s = self.encrypt_field(s, mapping.field_type)?;
                    encrypted += 1;
                }
                Ok(())
            })?;
        }
        Ok(encrypted)
    }

    /// Decrypt every mapped field in place. Plain values are skipped.
    pub fn decrypt_fields(
        &self,
        record: &mut Value,
        mappings: &[FieldMapping],
        policy: DecryptPolicy,
    ) -> Result<DecryptReport, CryptoError> {
        let mut report = DecryptReport::default();
        for mapping in mappings {
            let field_type: FieldType = mapping.field_type;
            let mut passed = false;
            visit_leaves(record, &mapping.path, &mut |s| {
                if !Self::is_encrypted(s) {
                    return Ok(());
                }
                match self.decrypt_field(s, field_type) {
                    Ok(plain) => {
                        *s = plain;
                        report.decrypted += 1;
                        Ok(())
                    }
                    Err(e) if policy == DecryptPolicy::PassThroughOnError => {
                        warn!(
                            path = %mapping.path,
                            error = %e,
                            "Leaving undecryptable field as ciphertext"
                        );
                        passed = true;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            })?;
            if passed {
                report.passed_through.push(mapping.path.to_string());
            }
        }
        Ok(report)
    }
}

/// Codec applied at a store boundary for one registry of record types.
#[derive(Clone)]
pub struct RecordCodec {
    service: Arc<FieldEncryptionService>,
}

impl RecordCodec {
    pub fn new(service: Arc<FieldEncryptionService>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &FieldEncryptionService {
        &self.service
    }

    /// Serialize a record and encrypt its sensitive fields.
    pub fn encode<T: Serialize>(
        &self,
        record_type: RecordType,
        record: &T,
    ) -> Result<Value, CryptoError> {
        let mut value = serde_json::to_value(record)?;
        self.service
            .encrypt_fields(&mut value, record_type.mappings())?;
        Ok(value)
    }

    /// Decrypt sensitive fields and deserialize the record.
    pub fn decode<T: DeserializeOwned>(
        &self,
        record_type: RecordType,
        mut value: Value,
        policy: DecryptPolicy,
    ) -> Result<(T, DecryptReport), CryptoError> {
        let report = self
            .service
            .decrypt_fields(&mut value, record_type.mappings(), policy)?;
        Ok((serde_json::from_value(value)?, report))
    }
}
