//! Bounded pool of migrated SQLite connections.
//!
//! # Invariants
//! - At most `max_size` connections are open at any time.
//! - A checked-out connection is used by exactly one caller.
//! - Connections return to the pool with no progress handler installed.

use super::open::open_db;
use super::{DbError, DbResult};
use crate::context::{is_past, OpContext};
use parking_lot::{Condvar, Mutex};
use rusqlite::Connection;
use std::ops::{Deref, DerefMut};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// VM instructions between two context checks of a running statement.
const PROGRESS_OPS: i32 = 1_000;
/// Upper bound for one wait on an exhausted pool before re-checking context.
const WAIT_SLICE: Duration = Duration::from_millis(50);

struct PoolState {
    idle: Vec<Connection>,
    open: usize,
}

/// Thread-safe pool of connections to one database file.
pub struct ConnectionPool {
    path: PathBuf,
    max_size: usize,
    busy_timeout: Duration,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl ConnectionPool {
    /// Opens the first connection eagerly so migrations run exactly once.
    pub fn open(
        path: impl AsRef<Path>,
        max_size: usize,
        busy_timeout: Duration,
    ) -> DbResult<Self> {
        if max_size == 0 {
            return Err(DbError::InvalidPoolSize);
        }
        let path = path.as_ref().to_path_buf();
        let first = open_db(&path, busy_timeout)?;
        Ok(Self {
            path,
            max_size,
            busy_timeout,
            state: Mutex::new(PoolState {
                idle: vec![first],
                open: 1,
            }),
            available: Condvar::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Number of open connections (idle plus checked out).
    pub fn open_connections(&self) -> usize {
        self.state.lock().open
    }

    /// Checks out a connection, waiting while the pool is exhausted.
    ///
    /// # Errors
    /// - `DbError::Interrupted` when `ctx` is done before a connection frees up.
    /// - Bootstrap errors when a new connection cannot be opened.
    pub fn get(&self, ctx: &OpContext) -> DbResult<PooledConnection<'_>> {
        let mut state = self.state.lock();
        loop {
            ctx.check()?;

            if let Some(conn) = state.idle.pop() {
                return Ok(PooledConnection::new(self, conn));
            }

            if state.open < self.max_size {
                state.open += 1;
                drop(state);
                return match open_db(&self.path, self.busy_timeout) {
                    Ok(conn) => Ok(PooledConnection::new(self, conn)),
                    Err(err) => {
                        self.state.lock().open -= 1;
                        self.available.notify_one();
                        Err(err)
                    }
                };
            }

            let wait = ctx
                .remaining()
                .map_or(WAIT_SLICE, |remaining| remaining.min(WAIT_SLICE));
            self.available.wait_for(&mut state, wait);
        }
    }

    fn release(&self, conn: Connection) {
        self.state.lock().idle.push(conn);
        self.available.notify_one();
    }
}

/// Connection checked out of a [`ConnectionPool`]; returned on drop.
pub struct PooledConnection<'pool> {
    pool: &'pool ConnectionPool,
    /// `Some` for the guard's whole life; `Drop` is the only place that takes it.
    conn: Option<Connection>,
}

impl<'pool> PooledConnection<'pool> {
    fn new(pool: &'pool ConnectionPool, conn: Connection) -> Self {
        Self {
            pool,
            conn: Some(conn),
        }
    }

    /// Interrupts any statement on this connection once `ctx` is done.
    ///
    /// The handler stays installed until the connection goes back to the pool.
    pub fn watch(&self, ctx: &OpContext) {
        let cancel = AssertUnwindSafe(ctx.token().clone());
        let deadline = ctx.deadline_instant();
        self.progress_handler(
            PROGRESS_OPS,
            Some(move || cancel.is_cancelled() || is_past(deadline)),
        );
    }
}

impl Deref for PooledConnection<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        // `conn` is only emptied by `Drop`, after the last borrow.
        self.conn.as_ref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledConnection<'_> {
    fn deref_mut(&mut self) -> &mut Connection {
        // `conn` is only emptied by `Drop`, after the last borrow.
        self.conn.as_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledConnection<'_> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            unwatch(&conn);
            self.pool.release(conn);
        }
    }
}

/// Removes a handler installed by [`PooledConnection::watch`].
pub(crate) fn unwatch(conn: &Connection) {
    conn.progress_handler(0, None::<fn() -> bool>);
}
