//! Warden Core — domain models, error taxonomy, and the traits through
//! which the security services reach their collaborators (shared keyed
//! store, durable account store, security event sink).

pub mod clock;
pub mod error;
pub mod events;
pub mod models;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{WardenError, WardenResult};
pub use events::{EventSink, MemoryEventSink, SecurityEvents, TracingEventSink};
pub use store::{AccountStore, KeyedStore, StoreConfig};
