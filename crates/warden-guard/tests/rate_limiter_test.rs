//! Integration tests for the rate limiter against the in-memory keyed
//! store, driven by a manual clock.

use std::sync::Arc;
use std::time::Duration;

use warden_core::clock::ManualClock;
use warden_core::error::WardenError;
use warden_core::events::{MemoryEventSink, SecurityEvents};
use warden_core::models::event::SecurityEventType;
use warden_core::models::ip::REPUTATION_THRESHOLD_EXCEEDED;
use warden_core::models::rate_limit::{LimitType, ThreatLevel};
use warden_core::store::StoreConfig;
use warden_guard::{
    BlockOptions, DelayOptions, RateLimitConfig, RateLimitOptions, RateLimiter,
};
use warden_store::MemoryKeyedStore;

struct Harness {
    limiter: RateLimiter<MemoryKeyedStore, MemoryEventSink>,
    store: MemoryKeyedStore,
    sink: MemoryEventSink,
    clock: ManualClock,
}

fn setup() -> Harness {
    let clock = ManualClock::starting_now();
    let store = MemoryKeyedStore::with_clock(Arc::new(clock.clone()));
    let sink = MemoryEventSink::new();
    let events = SecurityEvents::new(
        sink.clone(),
        Arc::new(clock.clone()),
        Duration::from_millis(100),
    );
    let limiter = RateLimiter::new(
        store.clone(),
        events,
        Arc::new(clock.clone()),
        RateLimitConfig::default(),
        StoreConfig::default(),
    );
    Harness {
        limiter,
        store,
        sink,
        clock,
    }
}

// -----------------------------------------------------------------------
// Sliding window
// -----------------------------------------------------------------------

#[tokio::test]
async fn eleventh_auth_attempt_is_denied_until_window_elapses() {
    let h = setup();

    for i in 1..=10 {
        let outcome = h
            .limiter
            .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
            .await;
        assert!(outcome.allowed, "request {i} should be allowed");
        assert_eq!(outcome.count, i);
        assert_eq!(outcome.remaining, 10 - i);
        h.clock.advance(chrono::Duration::seconds(1));
    }

    let denied = h
        .limiter
        .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
        .await;
    assert!(!denied.allowed);
    assert!(denied.blocked);
    assert_eq!(denied.remaining, 0);
    assert_eq!(denied.retry_after_secs, Some(15 * 60));
    assert_eq!(h.sink.of_type(SecurityEventType::RateLimitExceeded).len(), 1);

    h.clock.advance(chrono::Duration::minutes(15));
    let allowed = h
        .limiter
        .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
        .await;
    assert!(allowed.allowed);
    assert_eq!(allowed.count, 1);
}

#[tokio::test]
async fn identifiers_and_limit_types_are_independent() {
    let h = setup();
    for _ in 0..10 {
        h.limiter
            .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
            .await;
    }

    let other_ip = h
        .limiter
        .check_rate_limit("10.0.0.2", LimitType::Auth, RateLimitOptions::default())
        .await;
    assert!(other_ip.allowed);

    let api = h
        .limiter
        .check_rate_limit("10.0.0.1", LimitType::Api, RateLimitOptions::default())
        .await;
    assert!(api.allowed);
    assert_eq!(api.limit, 100);
}

#[tokio::test]
async fn concurrent_requests_never_exceed_the_limit() {
    let h = Arc::new(setup());
    let mut handles = Vec::new();
    for _ in 0..25 {
        let h = Arc::clone(&h);
        handles.push(tokio::spawn(async move {
            h.limiter
                .check_rate_limit("user:42", LimitType::Auth, RateLimitOptions::default())
                .await
                .allowed
        }));
    }
    let mut allowed = 0;
    for handle in handles {
        if handle.await.unwrap() {
            allowed += 1;
        }
    }
    assert_eq!(allowed, 10);
}

#[tokio::test]
async fn reset_rate_limit_clears_the_window() {
    let h = setup();
    for _ in 0..11 {
        h.limiter
            .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
            .await;
    }
    assert_eq!(
        h.limiter
            .current_usage("10.0.0.1", LimitType::Auth)
            .await
            .unwrap(),
        11
    );

    assert!(
        h.limiter
            .reset_rate_limit("10.0.0.1", LimitType::Auth)
            .await
            .unwrap()
    );
    let outcome = h
        .limiter
        .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
        .await;
    assert!(outcome.allowed);
}

#[tokio::test]
async fn store_outage_fails_open_with_fault() {
    let h = setup();
    h.store.set_unavailable(true);

    let outcome = h
        .limiter
        .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
        .await;
    assert!(outcome.allowed);
    assert!(outcome.fault.is_some());
    assert_eq!(h.sink.of_type(SecurityEventType::StoreFault).len(), 1);

    let status = h.limiter.check_ip_block("10.0.0.1").await;
    assert!(!status.blocked);
    assert!(status.fault.is_some());
}

// -----------------------------------------------------------------------
// Threat levels and emergency override
// -----------------------------------------------------------------------

#[tokio::test]
async fn threat_level_scales_the_limit() {
    let h = setup();
    h.limiter
        .set_threat_level("/login", "high", Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(
        h.limiter.threat_level("/login").await.unwrap(),
        ThreatLevel::High
    );

    // 10 × 0.25 floors to 2.
    let opts = || RateLimitOptions::endpoint("/login");
    assert!(h.limiter.check_rate_limit("u1", LimitType::Auth, opts()).await.allowed);
    assert!(h.limiter.check_rate_limit("u1", LimitType::Auth, opts()).await.allowed);
    let third = h.limiter.check_rate_limit("u1", LimitType::Auth, opts()).await;
    assert!(!third.allowed);
    assert_eq!(third.limit, 2);

    // Expired threat levels no longer apply.
    h.clock.advance(chrono::Duration::seconds(601));
    assert_eq!(
        h.limiter.threat_level("/login").await.unwrap(),
        ThreatLevel::None
    );
}

#[tokio::test]
async fn critical_threat_keeps_at_least_one_request() {
    let h = setup();
    h.limiter
        .set_threat_level("/reset", "critical", Duration::from_secs(60))
        .await
        .unwrap();
    let outcome = h
        .limiter
        .check_rate_limit(
            "u1",
            LimitType::PasswordReset,
            RateLimitOptions::endpoint("/reset"),
        )
        .await;
    assert!(outcome.allowed);
    assert_eq!(outcome.limit, 1);
}

#[tokio::test]
async fn invalid_threat_level_is_rejected() {
    let h = setup();
    let err = h
        .limiter
        .set_threat_level("/login", "apocalyptic", Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }));
}

#[tokio::test]
async fn emergency_override_disables_enforcement_for_bounded_time() {
    let h = setup();
    for _ in 0..10 {
        h.limiter
            .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
            .await;
    }

    let state = h
        .limiter
        .activate_emergency_override("false positives", "oncall", Duration::from_secs(4 * 3600))
        .await
        .unwrap();
    // Capped at the configured maximum of one hour.
    assert_eq!((state.expires_at - state.activated_at).num_seconds(), 3600);
    assert_eq!(h.sink.of_type(SecurityEventType::EmergencyOverride).len(), 1);

    let outcome = h
        .limiter
        .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
        .await;
    assert!(outcome.allowed);

    assert!(h.limiter.deactivate_emergency_override("oncall").await.unwrap());
    let outcome = h
        .limiter
        .check_rate_limit("10.0.0.1", LimitType::Auth, RateLimitOptions::default())
        .await;
    assert!(!outcome.allowed);
}

#[tokio::test]
async fn emergency_override_expires_on_its_own() {
    let h = setup();
    h.limiter
        .activate_emergency_override("load test", "oncall", Duration::from_secs(600))
        .await
        .unwrap();
    assert!(h.limiter.emergency_status().await.unwrap().is_some());

    h.clock.advance(chrono::Duration::seconds(600));
    assert!(h.limiter.emergency_status().await.unwrap().is_none());
}

// -----------------------------------------------------------------------
// IP blocking and reputation
// -----------------------------------------------------------------------

#[tokio::test]
async fn reblocking_escalates_with_backoff() {
    let h = setup();
    let first = h
        .limiter
        .block_ip("203.0.113.7", "manual", BlockOptions::default())
        .await
        .unwrap();
    assert_eq!(first.level, 1);
    assert_eq!(first.duration_secs, 15 * 60);

    let second = h
        .limiter
        .block_ip("203.0.113.7", "manual", BlockOptions::default())
        .await
        .unwrap();
    assert_eq!(second.level, 3);
    assert_eq!(second.duration_secs, 4 * 15 * 60);
    assert_eq!(h.sink.of_type(SecurityEventType::IpBlocked).len(), 2);
}

#[tokio::test]
async fn block_without_backoff_keeps_base_duration() {
    let h = setup();
    let opts = || BlockOptions {
        backoff: Some(false),
        ..Default::default()
    };
    h.limiter.block_ip("203.0.113.8", "manual", opts()).await.unwrap();
    let second = h.limiter.block_ip("203.0.113.8", "manual", opts()).await.unwrap();
    assert_eq!(second.level, 2);
    assert_eq!(second.duration_secs, 15 * 60);
}

#[tokio::test]
async fn block_duration_is_capped() {
    let h = setup();
    let mut last = None;
    for _ in 0..10 {
        last = Some(
            h.limiter
                .block_ip("203.0.113.9", "manual", BlockOptions::default())
                .await
                .unwrap(),
        );
    }
    assert_eq!(last.unwrap().duration_secs, 24 * 3600);
}

#[tokio::test]
async fn block_rejects_non_ip_identifiers() {
    let h = setup();
    let err = h
        .limiter
        .block_ip("not-an-ip", "manual", BlockOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, WardenError::Validation { .. }));
}

#[tokio::test]
async fn expired_block_is_lifted_and_level_resets() {
    let h = setup();
    h.limiter
        .block_ip("198.51.100.1", "manual", BlockOptions::default())
        .await
        .unwrap();

    let status = h.limiter.check_ip_block("198.51.100.1").await;
    assert!(status.blocked);
    assert_eq!(status.retry_after_secs, Some(15 * 60));

    h.clock.advance(chrono::Duration::minutes(15));
    assert!(!h.limiter.check_ip_block("198.51.100.1").await.blocked);

    let again = h
        .limiter
        .block_ip("198.51.100.1", "manual", BlockOptions::default())
        .await
        .unwrap();
    assert_eq!(again.level, 1);
}

#[tokio::test]
async fn unblock_lifts_the_block() {
    let h = setup();
    h.limiter
        .block_ip("198.51.100.2", "manual", BlockOptions::default())
        .await
        .unwrap();
    assert!(h.limiter.unblock_ip("198.51.100.2", "oncall").await.unwrap());
    assert!(!h.limiter.check_ip_block("198.51.100.2").await.blocked);
    assert_eq!(h.sink.of_type(SecurityEventType::IpUnblocked).len(), 1);
}

#[tokio::test]
async fn emergency_override_suspends_ip_blocks() {
    let h = setup();
    h.limiter
        .block_ip("198.51.100.3", "manual", BlockOptions::default())
        .await
        .unwrap();
    h.limiter
        .activate_emergency_override("false positives", "oncall", Duration::from_secs(600))
        .await
        .unwrap();
    assert!(!h.limiter.check_ip_block("198.51.100.3").await.blocked);

    assert!(h.limiter.deactivate_emergency_override("oncall").await.unwrap());
    let status = h.limiter.check_ip_block("198.51.100.3").await;
    assert!(status.blocked);
    assert!(status.record.is_some());
}

#[tokio::test]
async fn progressive_delay_decays_reputation_until_block() {
    let h = setup();

    let first = h
        .limiter
        .apply_progressive_delay("192.0.2.10", 1, DelayOptions::default())
        .await;
    assert_eq!(first.delay, Duration::from_millis(1_000));
    assert_eq!(first.reputation, Some(-10));
    assert!(!first.blocked);

    let third = {
        h.limiter
            .apply_progressive_delay("192.0.2.10", 2, DelayOptions::default())
            .await;
        h.limiter
            .apply_progressive_delay("192.0.2.10", 3, DelayOptions::default())
            .await
    };
    assert_eq!(third.delay, Duration::from_millis(4_000));

    for attempt in 4..=5 {
        h.limiter
            .apply_progressive_delay("192.0.2.10", attempt, DelayOptions::default())
            .await;
    }
    assert_eq!(h.limiter.get_ip_reputation("192.0.2.10").await.unwrap(), -50);

    let status = h.limiter.check_ip_block("192.0.2.10").await;
    assert!(status.blocked);
    assert_eq!(
        status.record.unwrap().reason,
        REPUTATION_THRESHOLD_EXCEEDED
    );
}

#[tokio::test]
async fn progressive_delay_for_non_ip_skips_reputation() {
    let h = setup();
    let delay = h
        .limiter
        .apply_progressive_delay("alice@example.com", 10, DelayOptions::default())
        .await;
    assert_eq!(delay.delay, Duration::from_millis(30_000));
    assert_eq!(delay.reputation, None);
}

#[tokio::test]
async fn progressive_delay_survives_store_outage() {
    let h = setup();
    h.store.set_unavailable(true);
    let delay = h
        .limiter
        .apply_progressive_delay("192.0.2.11", 2, DelayOptions::default())
        .await;
    assert_eq!(delay.delay, Duration::from_millis(2_000));
    assert_eq!(delay.reputation, None);
}
