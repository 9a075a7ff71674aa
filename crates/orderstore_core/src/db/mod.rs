//! SQLite storage bootstrap, schema migration and connection pooling.
//!
//! # Responsibility
//! - Open and configure SQLite connections for the order store.
//! - Apply schema migrations in deterministic order.
//! - Hand out pooled connections bound to a caller context.
//!
//! # Invariants
//! - Migration version is tracked via `PRAGMA user_version`.
//! - Store code must not read/write order data before migrations succeed.

use crate::context::ContextError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod migrations;
mod open;
mod pool;

pub use open::{open_db, open_db_in_memory};
pub use pool::{ConnectionPool, PooledConnection};
pub(crate) use pool::unwatch;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// Pool was asked for zero connections.
    InvalidPoolSize,
    /// Caller context finished while waiting for or using a connection.
    Interrupted(ContextError),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "database schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::InvalidPoolSize => write!(f, "connection pool size must be at least 1"),
            Self::Interrupted(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Interrupted(err) => Some(err),
            Self::UnsupportedSchemaVersion { .. } | Self::InvalidPoolSize => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<ContextError> for DbError {
    fn from(value: ContextError) -> Self {
        Self::Interrupted(value)
    }
}
