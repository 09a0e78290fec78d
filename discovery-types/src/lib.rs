//! Domain model and trait contracts shared by the discovery engine and its
//! store adapter.
//!
//! This crate has no I/O of its own: it describes what a `Provider` and a
//! `Store` look like and the plain data that flows between them. Concrete
//! adapters live in `discovery-store` (Postgres) and in the engine's own
//! test fixtures (in-memory fakes).

mod error;
mod models;
mod provider;
mod store;

pub use error::{ProviderError, StoreError};
pub use models::{Email, ProviderEmail, ProviderUser, User, UserEmail};
pub use provider::Provider;
pub use store::{EmailInsertOutcome, Store};
