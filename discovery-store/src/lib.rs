//! Postgres adapter for the `discovery_types::Store` contract.
//!
//! This is the one concrete place the engine's `Store` trait is implemented
//! against a real database; the core itself depends only on the trait.

mod db;
mod error;
mod models;
mod schema;
mod store;

pub use db::{establish_pool, DbConnection, DbPool};
pub use store::PostgresStore;
