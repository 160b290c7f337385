//! PostgreSQL connection pool.
//!
//! Narrowed from the two-backend (SQLite/Postgres) pool the original
//! repository layer supported: the data model requires UUID v7 keys, JSONB
//! columns, `timestamptz`, and partial indices, none of which the SQLite
//! path could express, so this core targets Postgres only (see DESIGN.md).

use diesel_async::pooled_connection::deadpool::Pool as DeadPool;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;

use crate::error::{Error, Result};

/// Pooled async Postgres connection handle.
pub type PgConn = deadpool::managed::Object<AsyncDieselConnectionManager<AsyncPgConnection>>;

/// Diesel error type alias, kept for parity with repository method signatures.
pub type DbError = diesel::result::Error;

/// PostgreSQL connection pool shared by every repository.
#[derive(Clone)]
pub struct DbPool {
    pool: DeadPool<AsyncPgConnection>,
}

impl DbPool {
    /// Build a pool from a `postgres://` URL.
    pub fn new(database_url: &str, max_size: usize) -> Result<Self> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = DeadPool::builder(config)
            .max_size(max_size)
            .build()
            .map_err(|e| Error::Validation(format!("failed to build db pool: {e}")))?;
        Ok(Self { pool })
    }

    /// Check out a connection.
    pub async fn get(&self) -> Result<PgConn> {
        self.pool.get().await.map_err(Error::Pool)
    }
}

/// Run a block of Diesel DSL code against a checked-out connection.
///
/// Collapses the repetitive `let mut conn = self.pool.get().await?;` that
/// would otherwise open every repository method.
#[macro_export]
macro_rules! with_conn {
    ($pool:expr, $conn:ident => $body:expr) => {{
        let mut $conn = $pool.get().await?;
        $body
    }};
}

pub use crate::with_conn;
