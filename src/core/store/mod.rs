//! Typed persistence over the connection pool.
//!
//! Operations are free functions over a `SqliteConnection` so callers can
//! compose them inside one transaction (analyzers run their whole pass in a
//! single transaction with savepoint-guarded inserts). [`Store`] carries the
//! pool and hands out connections.

pub mod alerts;
pub mod jobs;
pub mod maintenance;
pub mod markets;
pub mod orderbooks;
pub mod relationships;
pub mod stats;
pub mod trades;

use crate::core::db::{DbConn, DbPool};
use crate::error::{Error, Result};

/// SQLite allows 999 bound variables per statement; chunk IN-lists well
/// below that.
pub(crate) const IN_CHUNK: usize = 500;

/// Handle to the persistence layer, cheap to clone.
#[derive(Clone)]
pub struct Store {
    pool: DbPool,
}

impl Store {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Check out a pooled connection.
    ///
    /// # Errors
    /// Returns [`Error::Connection`] when the pool is exhausted.
    pub fn conn(&self) -> Result<DbConn> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod testkit {
    use super::Store;
    use crate::core::db;

    /// Store over a fresh in-memory database with migrations applied.
    pub fn memory_store() -> Store {
        Store::new(db::test_pool())
    }
}
