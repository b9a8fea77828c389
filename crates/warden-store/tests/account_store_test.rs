//! Integration tests for the SurrealDB account store using in-memory
//! SurrealDB.

use std::sync::Arc;

use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::account::{CreateAccount, PostalAddress};
use warden_core::store::AccountStore;
use warden_crypto::{FieldEncryptionConfig, FieldEncryptionService, RecordCodec};
use warden_store::SurrealAccountStore;

fn codec() -> RecordCodec {
    let service = FieldEncryptionService::new(&FieldEncryptionConfig {
        master_secret: "account-store-test-secret".into(),
        kdf_iterations: 1_000,
        subkey_iterations: 100,
        ..Default::default()
    })
    .unwrap();
    RecordCodec::new(Arc::new(service))
}

async fn setup() -> (Surreal<Db>, SurrealAccountStore<Db>) {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    warden_store::run_migrations(&db).await.unwrap();
    let store = SurrealAccountStore::new(db.clone(), codec());
    (db, store)
}

fn new_account() -> CreateAccount {
    CreateAccount {
        email: "alice@example.com".into(),
        role: "member".into(),
        phone: Some("+15555550100".into()),
        address: Some(PostalAddress {
            street: Some("1 Main St".into()),
            city: Some("Springfield".into()),
            postal_code: Some("12345".into()),
            country: Some("US".into()),
        }),
        backup_codes: vec!["ABCD-1234".into(), "EFGH-5678".into()],
        api_credentials: Vec::new(),
    }
}

#[tokio::test]
async fn create_and_find_account() {
    let (_db, store) = setup().await;

    let created = store.create_account(new_account()).await.unwrap();
    assert_eq!(created.email, "alice@example.com");
    assert_eq!(created.token_version, 0);
    assert!(created.active);

    let fetched = store.find_account_by_id(created.id).await.unwrap();
    assert_eq!(fetched.email, created.email);
    assert_eq!(fetched.phone, created.phone);
    assert_eq!(fetched.address, created.address);
    assert_eq!(fetched.backup_codes, created.backup_codes);
}

#[tokio::test]
async fn sensitive_fields_are_encrypted_at_rest() {
    let (db, store) = setup().await;
    let created = store.create_account(new_account()).await.unwrap();

    let mut result = db
        .query("SELECT profile FROM type::record('account', $id)")
        .bind(("id", created.id.to_string()))
        .await
        .unwrap();
    let raw: Option<surrealdb_types::Value> = result.take(0).unwrap();
    let raw = format!("{:?}", raw.expect("row should exist"));

    assert!(!raw.contains("alice@example.com"));
    assert!(!raw.contains("Springfield"));
    assert!(!raw.contains("ABCD-1234"));
    assert!(raw.contains("$wenc$v1$"));
    // Non-sensitive address parts stay readable.
    assert!(raw.contains("US"));
}

#[tokio::test]
async fn increment_token_version_is_monotonic() {
    let (_db, store) = setup().await;
    let created = store.create_account(new_account()).await.unwrap();

    assert_eq!(store.increment_token_version(created.id).await.unwrap(), 1);
    assert_eq!(store.increment_token_version(created.id).await.unwrap(), 2);

    let fetched = store.find_account_by_id(created.id).await.unwrap();
    assert_eq!(fetched.token_version, 2);
}

#[tokio::test]
async fn set_active_toggles_account() {
    let (_db, store) = setup().await;
    let created = store.create_account(new_account()).await.unwrap();

    store.set_active(created.id, false).await.unwrap();
    assert!(!store.find_account_by_id(created.id).await.unwrap().active);
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let (_db, store) = setup().await;
    let err = store.find_account_by_id(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));

    let err = store
        .increment_token_version(Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}

#[tokio::test]
async fn wrong_key_fails_strict_read() {
    let (db, store) = setup().await;
    let created = store.create_account(new_account()).await.unwrap();

    let other_codec = RecordCodec::new(Arc::new(
        FieldEncryptionService::new(&FieldEncryptionConfig {
            master_secret: "a-different-secret".into(),
            kdf_iterations: 1_000,
            subkey_iterations: 100,
            ..Default::default()
        })
        .unwrap(),
    ));
    let other = SurrealAccountStore::new(db, other_codec);

    let err = other.find_account_by_id(created.id).await.unwrap_err();
    assert!(matches!(err, WardenError::Crypto(_)));
}
