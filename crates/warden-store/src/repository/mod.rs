//! Durable account store implementations.

mod account;
mod memory;

pub use account::SurrealAccountStore;
pub use memory::MemoryAccountStore;
