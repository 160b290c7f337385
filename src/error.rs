//! Crate-wide error types.
//!
//! Each module-local error enum is `thiserror`-based and safe to log or
//! surface to a caller via its `Display` impl; this module aggregates them
//! for code that needs to talk about "any crawlplane error" without caring
//! which subsystem raised it.

use thiserror::Error;

/// Aggregate error type returned by the crate's public entry points.
#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error(transparent)]
    Pool(#[from] deadpool::managed::PoolError<diesel_async::pooled_connection::PoolError>),

    #[error("queue error: {0}")]
    Queue(String),

    #[error("kv store error: {0}")]
    Kv(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
