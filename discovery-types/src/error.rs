use thiserror::Error;

/// Errors surfaced by a `Provider` implementation.
///
/// Per the error taxonomy this engine follows, every variant here is
/// transient from the engine's point of view: the caller logs it and
/// retries on the next tick. Nothing in this enum is fatal.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Request(String),

    #[error("provider returned a malformed identifier: {0}")]
    MalformedId(String),
}

/// Errors surfaced by a `Store` implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection unavailable: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("row not found")]
    NotFound,
}
