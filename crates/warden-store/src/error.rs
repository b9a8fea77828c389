//! Store-specific error types and conversions.

use warden_core::error::WardenError;

/// Store-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Invalid store configuration: {0}")]
    Config(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Wrong value type at key {key}")]
    WrongType { key: String },

    #[error("Store unavailable")]
    Unavailable,

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<StoreError> for WardenError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => WardenError::NotFound { entity, id },
            other => WardenError::Store(other.to_string()),
        }
    }
}
