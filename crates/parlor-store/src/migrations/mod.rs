//! Database migration runner.
//!
//! Migrations are executed in order on every [`Database::open`] call. Each
//! migration is guarded by a `user_version` pragma so it runs exactly once.
//!
//! [`Database::open`]: crate::Database::open

pub mod seed;
pub mod v001_initial;

use rusqlite::{Connection, TransactionBehavior};

use crate::error::{Result, StoreError};

/// Current schema version.  Bump this and add a new migration module whenever
/// the schema changes.
pub const CURRENT_VERSION: u32 = 1;

/// Run all pending migrations against the open connection.
///
/// Everything happens inside one write transaction, so two processes opening
/// the same empty file cannot both bootstrap it. When `seed_demo` is set the
/// demo rows are inserted together with the initial schema.
pub fn run_migrations(conn: &mut Connection, seed_demo: bool) -> Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let current: u32 = tx.pragma_query_value(None, "user_version", |row| row.get(0))?;

    tracing::info!(
        current_version = current,
        target_version = CURRENT_VERSION,
        "checking database migrations"
    );

    if current < 1 {
        tracing::info!("applying migration v001_initial");
        v001_initial::up(&tx).map_err(|e| StoreError::Migration(e.to_string()))?;

        if seed_demo {
            tracing::info!("inserting demo data");
            seed::insert(&tx).map_err(|e| StoreError::Migration(e.to_string()))?;
        }

        tx.pragma_update(None, "user_version", 1)?;
    }

    tx.commit()?;
    Ok(())
}
