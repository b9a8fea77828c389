//! Warden Store — implementations of the collaborator traits defined in
//! `warden-core`.
//!
//! This crate provides:
//! - Shared keyed stores ([`RedisKeyedStore`], [`MemoryKeyedStore`])
//! - Durable account stores ([`SurrealAccountStore`],
//!   [`MemoryAccountStore`]) with field encryption at the boundary
//! - Connection management ([`RedisConfig`], [`AccountDbConfig`],
//!   [`DbManager`]) and schema migrations ([`run_migrations`])
//! - Error types ([`StoreError`])

mod connection;
mod error;
pub mod keyed;
pub mod repository;
mod schema;

pub use connection::{AccountDbConfig, DbManager, RedisConfig};
pub use error::StoreError;
pub use keyed::{MemoryKeyedStore, RedisKeyedStore};
pub use repository::{MemoryAccountStore, SurrealAccountStore};
pub use schema::{run_migrations, schema_v1};
