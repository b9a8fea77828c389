//! Account domain model (owned by the durable account store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostalAddress {
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// A credential issued to an account for programmatic access.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiCredential {
    pub key_id: String,
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub active: bool,
    /// Global token epoch; bumped on mass invalidation.
    pub token_version: u64,
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
    #[serde(default)]
    pub backup_codes: Vec<String>,
    #[serde(default)]
    pub api_credentials: Vec<ApiCredential>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAccount {
    pub email: String,
    pub role: String,
    pub phone: Option<String>,
    pub address: Option<PostalAddress>,
    #[serde(default)]
    pub backup_codes: Vec<String>,
    #[serde(default)]
    pub api_credentials: Vec<ApiCredential>,
}
