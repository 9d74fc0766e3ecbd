//! Transaction envelope with pre-commit hooks.
//!
//! Every mutating operation runs through [`Database::with_transaction`]: the
//! body executes inside a `BEGIN IMMEDIATE` transaction, the registered hooks
//! then validate the uncommitted state in registration order, and only if all
//! of them pass is the transaction committed. Any error rolls everything back.

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::database::Database;
use crate::error::{Result, StoreError};

/// A validator run inside every transaction just before commit.
///
/// Hooks see the transaction's own uncommitted writes. Returning an error
/// aborts the transaction.
pub trait PrecommitHook: Send + Sync {
    /// Name reported in [`StoreError::PrecommitValidationFailed`].
    fn name(&self) -> &str;

    fn check(&self, conn: &Connection) -> Result<()>;
}

/// Adapts a closure into a [`PrecommitHook`].
pub struct FnHook<F> {
    name: String,
    f: F,
}

impl<F> FnHook<F>
where
    F: Fn(&Connection) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> PrecommitHook for FnHook<F>
where
    F: Fn(&Connection) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn check(&self, conn: &Connection) -> Result<()> {
        (self.f)(conn)
    }
}

impl Database {
    /// Register a hook for every subsequent transaction.
    ///
    /// Takes `&mut self`, so hooks can only be added while the handle is still
    /// exclusively owned, before it is shared between callers.
    pub fn add_precommit_hook<H>(&mut self, hook: H)
    where
        H: PrecommitHook + 'static,
    {
        tracing::info!(hook = hook.name(), "registered pre-commit hook");
        self.hooks.push(Box::new(hook));
    }

    /// Run `body` as one transaction.
    ///
    /// On success the hooks run, then the transaction commits. If the body,
    /// a hook, or the commit fails, the transaction is rolled back and the
    /// error returned; a hook failure is wrapped in
    /// [`StoreError::PrecommitValidationFailed`].
    pub fn with_transaction<T, F>(&self, body: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.pool().get()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let value = match body(&tx) {
            Ok(value) => value,
            Err(e) => return Err(rollback(tx, e)),
        };

        for hook in &self.hooks {
            if let Err(e) = hook.check(&tx) {
                tracing::warn!(
                    hook = hook.name(),
                    error = %e,
                    "pre-commit hook rejected transaction"
                );
                let err = StoreError::PrecommitValidationFailed {
                    hook: hook.name().to_string(),
                    source: Box::new(e),
                };
                return Err(rollback(tx, err));
            }
        }

        // A failed COMMIT leaves the transaction open; dropping `tx` rolls it back.
        tx.commit()?;
        Ok(value)
    }
}

/// Roll back `tx` after `original`, returning the error to surface.
///
/// Rolling back a transaction SQLite has already ended is a no-op.
fn rollback(tx: Transaction<'_>, original: StoreError) -> StoreError {
    if tx.is_autocommit() {
        tracing::debug!(error = %original, "transaction already finished, nothing to roll back");
        return original;
    }

    match tx.rollback() {
        Ok(()) => {
            tracing::warn!(error = %original, "transaction rolled back");
            original
        }
        Err(e) if is_transaction_done(&e) => original,
        Err(source) => {
            tracing::warn!(error = %source, "rollback failed");
            StoreError::RollbackFailed {
                original: Box::new(original),
                source,
            }
        }
    }
}

fn is_transaction_done(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("no transaction is active")
    )
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use rusqlite::params;

    use super::*;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("tx.db")).unwrap();
        (dir, db)
    }

    fn user_count(db: &Database) -> i64 {
        db.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn body_error_rolls_back() {
        let (_dir, db) = open();

        let result: Result<()> = db.with_transaction(|tx| {
            tx.execute("INSERT INTO users (user_name) VALUES (?1)", params!["ghost"])?;
            Err(StoreError::ConversationAlreadyExists)
        });

        assert!(matches!(result, Err(StoreError::ConversationAlreadyExists)));
        assert_eq!(user_count(&db), 0);
        assert_eq!(db.in_use_connections(), 0);
    }

    #[test]
    fn commit_persists_body_writes() {
        let (_dir, db) = open();
        let id: i64 = db
            .with_transaction(|tx| {
                tx.execute("INSERT INTO users (user_name) VALUES ('kept')", [])?;
                Ok(tx.last_insert_rowid())
            })
            .unwrap();
        assert!(id > 0);
        assert_eq!(user_count(&db), 1);
    }

    #[test]
    fn hooks_run_in_order_and_see_uncommitted_writes() {
        let (_dir, mut db) = open();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            let seen = Arc::clone(&seen);
            db.add_precommit_hook(FnHook::new(name, move |conn: &Connection| {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
                seen.lock().unwrap().push((name, n));
                Ok(())
            }));
        }

        db.with_transaction(|tx| {
            tx.execute("INSERT INTO users (user_name) VALUES ('visible')", [])?;
            Ok(())
        })
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![("first", 1), ("second", 1)]);
    }

    #[test]
    fn hook_failure_rolls_back_and_wraps_error() {
        let (_dir, mut db) = open();
        db.add_precommit_hook(FnHook::new("reject_all", |_: &Connection| {
            Err(StoreError::NotFound(crate::error::Entity::UserName("x".into())))
        }));

        let result = db.with_transaction(|tx| {
            tx.execute("INSERT INTO users (user_name) VALUES ('nope')", [])?;
            Ok(())
        });

        match result {
            Err(StoreError::PrecommitValidationFailed { hook, source }) => {
                assert_eq!(hook, "reject_all");
                assert!(matches!(*source, StoreError::NotFound(_)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(user_count(&db), 0);
    }

    #[test]
    fn later_hooks_are_skipped_after_a_failure() {
        let (_dir, mut db) = open();
        let ran = Arc::new(Mutex::new(false));
        let ran_in_hook = Arc::clone(&ran);

        db.add_precommit_hook(FnHook::new("fails", |_: &Connection| {
            Err(StoreError::ConversationAlreadyExists)
        }));
        db.add_precommit_hook(FnHook::new("never", move |_: &Connection| {
            *ran_in_hook.lock().unwrap() = true;
            Ok(())
        }));

        assert!(db.with_transaction(|_| Ok(())).is_err());
        assert!(!*ran.lock().unwrap());
    }

    #[test]
    fn rollback_of_finished_transaction_is_a_no_op() {
        let (_dir, db) = open();

        let result: Result<()> = db.with_transaction(|tx| {
            tx.execute("INSERT INTO users (user_name) VALUES ('gone')", [])?;
            tx.execute_batch("ROLLBACK")?;
            Err(StoreError::ConversationAlreadyExists)
        });

        // The original error surfaces, not a "no transaction is active" failure.
        assert!(matches!(result, Err(StoreError::ConversationAlreadyExists)));
        assert_eq!(user_count(&db), 0);
    }
}
