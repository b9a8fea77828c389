//! Account database settings are checked before anything is dialed.

use warden_store::{AccountDbConfig, DbManager, StoreError};

#[test]
fn default_account_db_config_is_valid() {
    AccountDbConfig::default().validate().unwrap();
}

#[tokio::test]
async fn connect_rejects_blank_namespace_without_dialing() {
    let config = AccountDbConfig {
        // Nothing listens here; a dial attempt would surface as a Surreal error.
        url: "127.0.0.1:1".into(),
        namespace: "  ".into(),
        ..AccountDbConfig::default()
    };
    match DbManager::connect(&config).await {
        Err(StoreError::Config(msg)) => assert!(msg.contains("namespace")),
        Err(other) => panic!("expected config error, got {other}"),
        Ok(_) => panic!("blank namespace accepted"),
    }
}

#[test]
fn blank_database_is_reported_as_a_store_error() {
    let config = AccountDbConfig {
        database: String::new(),
        ..AccountDbConfig::default()
    };
    let err = config.validate().unwrap_err();
    assert!(matches!(err, StoreError::Config(_)));
    let warden: warden_core::error::WardenError = err.into();
    assert!(warden.to_string().contains("account_db.database"));
}
