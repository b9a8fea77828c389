//! Connection management for Redis (keyed store) and SurrealDB
//! (account store).

use serde::Deserialize;
use surrealdb::Surreal;
use surrealdb::engine::remote::ws::{Client, Ws};
use surrealdb::opt::auth::Root;
use tracing::info;
use warden_crypto::RecordCodec;

use crate::error::StoreError;
use crate::repository::SurrealAccountStore;
use crate::schema::run_migrations;

/// Configuration for the shared keyed store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    /// Connection URL (e.g., `redis://127.0.0.1:6379/0`).
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379/0".into(),
        }
    }
}

/// Configuration for connecting to SurrealDB.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccountDbConfig {
    /// WebSocket URL (e.g., `127.0.0.1:8000`).
    pub url: String,
    /// SurrealDB namespace.
    pub namespace: String,
    /// SurrealDB database name.
    pub database: String,
    /// Root username for authentication.
    pub username: String,
    /// Root password for authentication.
    pub password: String,
}

impl Default for AccountDbConfig {
    fn default() -> Self {
        Self {
            url: "127.0.0.1:8000".into(),
            namespace: "warden".into(),
            database: "accounts".into(),
            username: "root".into(),
            password: "root".into(),
        }
    }
}

impl AccountDbConfig {
    /// Reject settings that could only fail once dialed.
    pub fn validate(&self) -> Result<(), StoreError> {
        let required = [
            ("url", &self.url),
            ("namespace", &self.namespace),
            ("database", &self.database),
            ("username", &self.username),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(StoreError::Config(format!("account_db.{name} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Handle on the account database: connected, authenticated, scoped to
/// the configured namespace and migrated to the current schema.
#[derive(Clone)]
pub struct DbManager {
    db: Surreal<Client>,
}

impl DbManager {
    pub async fn connect(config: &AccountDbConfig) -> Result<Self, StoreError> {
        config.validate()?;
        info!(
            url = %config.url,
            namespace = %config.namespace,
            database = %config.database,
            "Connecting account database"
        );

        let db = Surreal::new::<Ws>(&config.url).await?;
        db.signin(Root {
            username: config.username.clone(),
            password: config.password.clone(),
        })
        .await?;
        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await?;
        run_migrations(&db).await?;

        info!(namespace = %config.namespace, "Account database ready");
        Ok(Self { db })
    }

    /// Account store over this connection, encrypting sensitive fields
    /// with `codec`.
    pub fn account_store(&self, codec: RecordCodec) -> SurrealAccountStore<Client> {
        SurrealAccountStore::new(self.db.clone(), codec)
    }
}
