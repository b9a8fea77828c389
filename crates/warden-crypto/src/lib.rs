//! Warden Crypto — key derivation, authenticated field encryption,
//! integrity signing, and password hashing.

pub mod codec;
pub mod envelope;
pub mod error;
pub mod field;
pub mod mapping;
pub mod password;
pub mod primitives;

pub use codec::{DecryptPolicy, DecryptReport, RecordCodec};
pub use envelope::FieldEnvelope;
pub use error::CryptoError;
pub use field::{FieldEncryptionConfig, FieldEncryptionService, FieldType};
pub use mapping::{FieldMapping, FieldPath, RecordType};
