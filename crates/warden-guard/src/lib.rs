//! Warden Guard — adaptive rate limiting and IP reputation.
//!
//! A single [`RateLimiter`] owns every rate-limit window, threat level,
//! emergency override, reputation score and IP block record. All state
//! lives in a [`KeyedStore`](warden_core::KeyedStore); store faults fail
//! open and are reported on the returned value.

pub mod config;
mod limiter;
mod reputation;
mod threat;

pub use config::{
    BlockConfig, DelayConfig, LimitsConfig, RateLimitConfig, ThreatMultipliers, WindowConfig,
};
pub use limiter::{RateLimitOptions, RateLimiter};
pub use reputation::{BlockOptions, DelayOptions, ProgressiveDelay, is_ip, progressive_delay};
pub use threat::ThreatLevelState;
