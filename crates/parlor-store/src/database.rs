//! Database handle and connection management.
//!
//! The [`Database`] struct owns a [`ConnectionPool`] and guarantees that
//! migrations are run before any other operation. It is `Sync`; share it
//! between request handlers behind an `Arc`.

use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::migrations;
use crate::pool::{self, ConnectionPool};
use crate::sanitize::SanitizeHook;
use crate::transaction::PrecommitHook;

/// Handle to the chat store.
pub struct Database {
    pool: ConnectionPool,
    path: PathBuf,
    pub(crate) hooks: Vec<Box<dyn PrecommitHook>>,
    pub(crate) default_photo: String,
}

impl Database {
    /// Open (or create) the database described by `config`.
    ///
    /// Runs pending migrations (seeding demo data on first initialization if
    /// enabled) and registers a sanitation hook when the config has rules.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let db_path = config.resolve_db_path()?;

        tracing::info!(path = %db_path.display(), "opening database");

        let pool = pool::build(
            &db_path,
            config.max_open_connections,
            config.max_idle_connections,
            config.busy_timeout,
        )?;

        {
            let mut conn = pool.get()?;
            migrations::run_migrations(&mut conn, config.seed_demo_data)?;
        }

        let mut db = Self {
            pool,
            path: db_path,
            hooks: Vec::new(),
            default_photo: config.default_photo.clone(),
        };

        if !config.sanitize_rules.is_empty() {
            let hook = SanitizeHook::new(config.sanitize_rules.clone())?;
            db.add_precommit_hook(hook);
        }

        Ok(db)
    }

    /// Open (or create) an unseeded database at an explicit path.
    ///
    /// This is useful for tests and for embedding the store inside custom
    /// directory layouts.
    pub fn open_at(path: &Path) -> Result<Self> {
        let config = StoreConfig {
            seed_demo_data: false,
            ..StoreConfig::at(path)
        };
        Self::open(&config)
    }

    /// Liveness check: round-trips a trivial query on a pooled connection.
    pub fn ping(&self) -> Result<()> {
        let conn = self.pool.get()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Number of open connections, idle or in use.
    pub fn open_connections(&self) -> usize {
        pool::open_connections(&self.pool)
    }

    /// Number of connections currently checked out.
    pub fn in_use_connections(&self) -> usize {
        pool::in_use_connections(&self.pool)
    }

    /// Filesystem path of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run a read-only closure on any available connection.
    ///
    /// No transaction is opened; each statement sees its own snapshot.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.pool.get()?;
        f(&conn)
    }

    pub(crate) fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}
