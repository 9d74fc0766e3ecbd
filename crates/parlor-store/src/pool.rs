//! SQLite connection pool.
//!
//! A thin layer over `r2d2` / `r2d2_sqlite`: every connection the pool opens
//! is initialized with the store's pragmas before it is handed out.

use std::path::Path;
use std::time::Duration;

use r2d2_sqlite::SqliteConnectionManager;

use crate::error::Result;

pub type ConnectionPool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Build a pool over the database file at `path`.
///
/// At most `max_open` connections exist at once; callers beyond that wait
/// for a release. The pool keeps up to `max_idle` connections ready.
pub fn build(
    path: &Path,
    max_open: usize,
    max_idle: usize,
    busy_timeout: Duration,
) -> Result<ConnectionPool> {
    let max_size = u32::try_from(max_open).unwrap_or(u32::MAX).max(1);
    let min_idle = u32::try_from(max_idle).unwrap_or(u32::MAX).min(max_size);

    let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
        // Busy timeout first: switching a fresh file to WAL takes a write lock.
        conn.busy_timeout(busy_timeout)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(())
    });

    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .min_idle(Some(min_idle))
        .build(manager)?;

    tracing::debug!(
        path = %path.display(),
        max_size,
        min_idle,
        "built connection pool"
    );
    Ok(pool)
}

/// Connections currently open, idle or checked out.
pub fn open_connections(pool: &ConnectionPool) -> usize {
    pool.state().connections as usize
}

/// Connections currently checked out.
pub fn in_use_connections(pool: &ConnectionPool) -> usize {
    let state = pool.state();
    state.connections.saturating_sub(state.idle_connections) as usize
}
