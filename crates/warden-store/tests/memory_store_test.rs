//! Tests for the in-memory account store.

use uuid::Uuid;
use warden_core::error::WardenError;
use warden_core::models::account::CreateAccount;
use warden_core::store::AccountStore;
use warden_store::MemoryAccountStore;

fn new_account(email: &str) -> CreateAccount {
    CreateAccount {
        email: email.into(),
        role: "member".into(),
        phone: None,
        address: None,
        backup_codes: Vec::new(),
        api_credentials: Vec::new(),
    }
}

#[tokio::test]
async fn token_version_bumps_are_not_lost_under_concurrency() {
    let store = MemoryAccountStore::new();
    let account = store.create_account(new_account("a@example.com")).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.increment_token_version(account.id).await.unwrap()
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let fetched = store.find_account_by_id(account.id).await.unwrap();
    assert_eq!(fetched.token_version, 20);
}

#[tokio::test]
async fn missing_account_is_not_found() {
    let store = MemoryAccountStore::new();
    let err = store.set_active(Uuid::new_v4(), false).await.unwrap_err();
    assert!(matches!(err, WardenError::NotFound { .. }));
}
