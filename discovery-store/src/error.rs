use diesel_async::pooled_connection::deadpool::PoolError;
use discovery_types::StoreError;

pub fn from_pool_error(err: PoolError) -> StoreError {
    StoreError::Connection(err.to_string())
}

pub fn from_diesel_error(err: diesel::result::Error) -> StoreError {
    match err {
        diesel::result::Error::NotFound => StoreError::NotFound,
        other => StoreError::Query(other.to_string()),
    }
}
