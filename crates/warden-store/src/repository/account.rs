//! SurrealDB implementation of [`AccountStore`].
//!
//! Contact details and credentials are kept in the `profile` object,
//! encrypted per field by a [`RecordCodec`] before every write and
//! decrypted after every read. Reads use [`DecryptPolicy::Strict`]: an
//! account whose profile cannot be decrypted is not returned.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::debug;
use uuid::Uuid;
use warden_core::error::WardenResult;
use warden_core::models::account::{Account, ApiCredential, CreateAccount, PostalAddress};
use warden_core::store::AccountStore;
use warden_crypto::{DecryptPolicy, RecordCodec, RecordType};

use crate::error::StoreError;

/// DB-side row struct; the record id is supplied by the caller.
#[derive(Debug, SurrealValue)]
struct AccountRow {
    role: String,
    active: bool,
    token_version: i64,
    profile: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct VersionRow {
    token_version: i64,
}

/// The encrypted part of an account, in the shape
/// [`RecordType::Account`] maps.
#[derive(Debug, Serialize, Deserialize)]
struct AccountProfile {
    email: String,
    phone: Option<String>,
    address: Option<PostalAddress>,
    #[serde(default)]
    backup_codes: Vec<String>,
    #[serde(default)]
    api_credentials: Vec<ApiCredential>,
}

fn to_version(raw: i64) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative token version {raw}")))
}

/// SurrealDB implementation of the account store.
#[derive(Clone)]
pub struct SurrealAccountStore<C: Connection> {
    db: Surreal<C>,
    codec: RecordCodec,
}

impl<C: Connection> SurrealAccountStore<C> {
    pub fn new(db: Surreal<C>, codec: RecordCodec) -> Self {
        Self { db, codec }
    }

    fn into_account(&self, id: Uuid, row: AccountRow) -> WardenResult<Account> {
        let (profile, _): (AccountProfile, _) =
            self.codec
                .decode(RecordType::Account, row.profile, DecryptPolicy::Strict)?;
        Ok(Account {
            id,
            email: profile.email,
            role: row.role,
            active: row.active,
            token_version: to_version(row.token_version)?,
            phone: profile.phone,
            address: profile.address,
            backup_codes: profile.backup_codes,
            api_credentials: profile.api_credentials,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    fn not_found(id: &str) -> StoreError {
        StoreError::NotFound {
            entity: "account".into(),
            id: id.to_string(),
        }
    }
}

impl<C: Connection> AccountStore for SurrealAccountStore<C> {
    async fn create_account(&self, input: CreateAccount) -> WardenResult<Account> {
        let id = Uuid::new_v4();
        let id_str = id.to_string();

        let profile = self.codec.encode(
            RecordType::Account,
            &AccountProfile {
                email: input.email,
                phone: input.phone,
                address: input.address,
                backup_codes: input.backup_codes,
                api_credentials: input.api_credentials,
            },
        )?;

        let result = self
            .db
            .query(
                "CREATE type::record('account', $id) SET \
                 role = $role, active = true, token_version = 0, \
                 profile = $profile",
            )
            .bind(("id", id_str.clone()))
            .bind(("role", input.role))
            .bind(("profile", profile))
            .await
            .map_err(StoreError::from)?;

        let mut result = result
            .check()
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        let rows: Vec<AccountRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Self::not_found(&id_str))?;

        debug!(account_id = %id, "Created account");
        self.into_account(id, row)
    }

    async fn find_account_by_id(&self, id: Uuid) -> WardenResult<Account> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('account', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<AccountRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Self::not_found(&id_str))?;

        self.into_account(id, row)
    }

    async fn increment_token_version(&self, id: Uuid) -> WardenResult<u64> {
        let id_str = id.to_string();

        // A single UPDATE is atomic per record, so concurrent bumps never
        // lose an increment.
        let mut result = self
            .db
            .query(
                "UPDATE type::record('account', $id) SET \
                 token_version += 1, updated_at = time::now() \
                 RETURN token_version",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<VersionRow> = result.take(0).map_err(StoreError::from)?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| Self::not_found(&id_str))?;

        Ok(to_version(row.token_version)?)
    }

    async fn set_active(&self, id: Uuid, active: bool) -> WardenResult<()> {
        let id_str = id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('account', $id) SET \
                 active = $active, updated_at = time::now() \
                 RETURN token_version",
            )
            .bind(("id", id_str.clone()))
            .bind(("active", active))
            .await
            .map_err(StoreError::from)?;

        let rows: Vec<VersionRow> = result.take(0).map_err(StoreError::from)?;
        if rows.is_empty() {
            return Err(Self::not_found(&id_str).into());
        }
        Ok(())
    }
}
