//! Warden Server — process entry point.
//!
//! Loads configuration, connects the shared keyed store and the account
//! database, wires the security services together and keeps them running
//! until interrupted.

mod config;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use warden_auth::SessionManager;
use warden_core::clock::{Clock, SystemClock};
use warden_core::events::{EventSink, SecurityEvents, TracingEventSink};
use warden_core::store::KeyedStore;
use warden_crypto::{FieldEncryptionService, RecordCodec};
use warden_guard::RateLimiter;
use warden_store::{DbManager, RedisKeyedStore};

use crate::config::WardenConfig;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn init_tracing() -> Result<(), BoxError> {
    let directive: Directive = "warden=info".parse()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive))
        .json()
        .init();
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = init_tracing() {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run().await {
        error!(error = %e, "Warden server failed");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), BoxError> {
    let config = WardenConfig::load()?;
    info!(
        key_prefix = %config.store.key_prefix,
        issuer = %config.auth.jwt_issuer,
        "Starting Warden server..."
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let keyed = RedisKeyedStore::connect(&config.redis).await?;

    let db = DbManager::connect(&config.account_db).await?;

    let encryption = Arc::new(FieldEncryptionService::new(&config.encryption)?);
    let accounts = db.account_store(RecordCodec::new(encryption));

    let events = SecurityEvents::new(
        TracingEventSink,
        Arc::clone(&clock),
        Duration::from_millis(config.events.delivery_timeout_ms),
    );
    let guard = Arc::new(RateLimiter::new(
        keyed.clone(),
        events.clone(),
        Arc::clone(&clock),
        config.rate_limit.clone(),
        config.store.clone(),
    ));
    let _sessions = SessionManager::new(
        keyed,
        accounts,
        Arc::clone(&guard),
        events,
        Arc::clone(&clock),
        config.auth.clone(),
        config.anomaly.clone(),
        config.store.clone(),
    )?;
    info!(
        access_ttl_secs = config.auth.access_token_lifetime_secs,
        refresh_ttl_secs = config.auth.refresh_token_lifetime_secs,
        "Session manager ready"
    );

    let interval = Duration::from_secs(config.maintenance.interval_secs);
    tokio::select! {
        () = status_sweep(&guard, interval) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown signal received");
        }
    }

    info!("Warden server stopped.");
    Ok(())
}

/// Periodically report enforcement state that operators must not forget
/// about: an active emergency override disables every rate limit.
async fn status_sweep<S, E>(guard: &RateLimiter<S, E>, every: Duration)
where
    S: KeyedStore,
    E: EventSink,
{
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match guard.emergency_status().await {
            Ok(Some(status)) => warn!(
                reason = %status.reason,
                operator = %status.operator,
                expires_at = %status.expires_at,
                "Emergency override active, rate limiting disabled"
            ),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Emergency status check failed"),
        }
    }
}
