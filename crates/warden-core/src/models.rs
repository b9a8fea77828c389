//! Domain models for Warden.
//!
//! These are the types shared across all crates. Records that live in
//! the shared keyed store are serialized as JSON.

pub mod account;
pub mod device;
pub mod event;
pub mod ip;
pub mod rate_limit;
pub mod risk;
pub mod session;
