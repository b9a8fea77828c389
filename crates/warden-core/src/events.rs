//! Security event emission.
//!
//! [`SecurityEvents`] stamps events and writes them through to an
//! [`EventSink`]. Delivery is bounded by a timeout and failures are only
//! logged: a broken sink never fails the request that raised the event.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::WardenResult;
use crate::models::event::{NewSecurityEvent, SecurityEvent, SecurityEventType, Severity};

/// External consumer of security events (alerting, SIEM forwarding).
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &SecurityEvent) -> impl Future<Output = WardenResult<()>> + Send;
}

/// Emits each event as a structured log line at a level matching its
/// severity.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    async fn publish(&self, event: &SecurityEvent) -> WardenResult<()> {
        let details = event.details.to_string();
        let account_id = event.account_id.map(|id| id.to_string());
        macro_rules! emit {
            ($level:ident) => {
                $level!(
                    correlation_id = %event.correlation_id,
                    event_type = event.event_type.as_str(),
                    severity = ?event.severity,
                    account_id = account_id.as_deref(),
                    ip = event.ip_address.as_deref(),
                    device = event.device_fingerprint.as_deref(),
                    details = %details,
                    "security event"
                )
            };
        }
        match event.severity {
            Severity::Low => emit!(debug),
            Severity::Medium => emit!(info),
            Severity::High => emit!(warn),
            Severity::Critical => emit!(error),
        }
        Ok(())
    }
}

/// Collects events in memory. Used by tests and local development.
#[derive(Debug, Clone, Default)]
pub struct MemoryEventSink {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn of_type(&self, event_type: SecurityEventType) -> Vec<SecurityEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }
}

impl EventSink for MemoryEventSink {
    async fn publish(&self, event: &SecurityEvent) -> WardenResult<()> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event.clone());
        Ok(())
    }
}

/// Write-through event log shared by every service.
#[derive(Clone)]
pub struct SecurityEvents<E> {
    sink: E,
    clock: Arc<dyn Clock>,
    delivery_timeout: Duration,
}

impl<E: EventSink> SecurityEvents<E> {
    pub fn new(sink: E, clock: Arc<dyn Clock>, delivery_timeout: Duration) -> Self {
        Self {
            sink,
            clock,
            delivery_timeout,
        }
    }

    pub fn sink(&self) -> &E {
        &self.sink
    }

    /// Stamp and deliver an event. Returns the stamped event.
    pub async fn record(&self, event: NewSecurityEvent) -> SecurityEvent {
        let event = SecurityEvent {
            correlation_id: Uuid::new_v4(),
            event_type: event.event_type,
            severity: event.severity,
            account_id: event.account_id,
            ip_address: event.ip_address,
            device_fingerprint: event.device_fingerprint,
            details: event.details,
            timestamp: self.clock.now(),
        };

        match tokio::time::timeout(self.delivery_timeout, self.sink.publish(&event)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(
                correlation_id = %event.correlation_id,
                event_type = event.event_type.as_str(),
                error = %e,
                "Security event delivery failed"
            ),
            Err(_) => warn!(
                correlation_id = %event.correlation_id,
                event_type = event.event_type.as_str(),
                "Security event delivery timed out"
            ),
        }

        event
    }
}
