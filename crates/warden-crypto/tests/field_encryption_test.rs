//! Integration tests for the field encryption service and record codec.

use std::sync::Arc;

use chrono::Utc;
use warden_core::models::account::{Account, ApiCredential, PostalAddress};
use warden_crypto::{
    CryptoError, DecryptPolicy, FieldEncryptionConfig, FieldEncryptionService, FieldType,
    RecordCodec, RecordType,
};

fn config(secret: &str) -> FieldEncryptionConfig {
    FieldEncryptionConfig {
        master_secret: secret.into(),
        kdf_iterations: 2_000,
        subkey_iterations: 200,
        ..Default::default()
    }
}

fn sample_account() -> Account {
    let now = Utc::now();
    Account {
        id: uuid::Uuid::new_v4(),
        email: "reader@library.example".into(),
        role: "member".into(),
        active: true,
        token_version: 0,
        phone: Some("+31 20 555 0101".into()),
        address: Some(PostalAddress {
            street: Some("Keizersgracht 1".into()),
            city: Some("Amsterdam".into()),
            postal_code: Some("1015 CJ".into()),
            country: Some("NL".into()),
        }),
        backup_codes: vec!["QX7R-22LM".into(), "PP0A-9J3K".into()],
        api_credentials: vec![ApiCredential {
            key_id: "key_1".into(),
            secret: "sk_live_abcdef".into(),
            created_at: now,
        }],
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn roundtrip_holds_for_assorted_values() {
    let svc = FieldEncryptionService::new(&config("integration")).unwrap();
    let long = "x".repeat(4096);
    let values: [&str; 6] = [
        "a",
        "alice@example.com",
        "   padded   ",
        "ünïcödé ✓",
        "$not$an$envelope",
        &long,
    ];
    for v in values {
        let enc = svc.encrypt_field(v, FieldType::Email).unwrap();
        assert!(FieldEncryptionService::is_encrypted(&enc));
        assert_eq!(svc.decrypt_field(&enc, FieldType::Email).unwrap(), v);
        assert!(!FieldEncryptionService::is_encrypted(v));
    }
}

#[test]
fn account_codec_encrypts_sensitive_fields_only() {
    let codec = RecordCodec::new(Arc::new(
        FieldEncryptionService::new(&config("integration")).unwrap(),
    ));
    let account = sample_account();

    let stored = codec.encode(RecordType::Account, &account).unwrap();
    let raw = stored.to_string();
    for secret in [
        "reader@library.example",
        "+31 20 555 0101",
        "Keizersgracht 1",
        "QX7R-22LM",
        "sk_live_abcdef",
    ] {
        assert!(!raw.contains(secret), "{secret} leaked into stored record");
    }
    assert_eq!(stored["role"], "member");
    assert_eq!(stored["address"]["country"], "NL");

    let (decoded, report): (Account, _) = codec
        .decode(RecordType::Account, stored, DecryptPolicy::Strict)
        .unwrap();
    assert_eq!(decoded, account);
    assert_eq!(report.decrypted, 8);
}

#[test]
fn corrupted_ciphertext_is_distinct_from_plaintext() {
    let svc = FieldEncryptionService::new(&config("integration")).unwrap();
    let enc = svc.encrypt_field("secret", FieldType::Token).unwrap();

    // Flip a character inside the ciphertext segment.
    let mut segments: Vec<String> = enc.split('$').map(String::from).collect();
    let ct = segments.len() - 2;
    let flipped = if segments[ct].starts_with('A') { "B" } else { "A" };
    segments[ct].replace_range(0..1, flipped);
    let corrupted = segments.join("$");

    assert!(matches!(
        svc.decrypt_field(&corrupted, FieldType::Token),
        Err(CryptoError::Decryption)
    ));
    assert!(matches!(
        svc.decrypt_field("secret", FieldType::Token),
        Err(CryptoError::NotEncrypted)
    ));
}
