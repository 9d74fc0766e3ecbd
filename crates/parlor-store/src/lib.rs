//! # parlor-store
//!
//! Persistence layer for the Parlor chat service, backed by SQLite.
//!
//! The crate exposes a synchronous, thread-safe `Database` handle over a small
//! connection pool. Every mutating operation runs as exactly one `BEGIN
//! IMMEDIATE` transaction, followed by the registered pre-commit hooks, so
//! sequence-number allocation and check-then-act logic stay atomic under
//! concurrent callers.

pub mod comments;
pub mod config;
pub mod constants;
pub mod conversations;
pub mod database;
pub mod groups;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod photos;
pub mod pool;
pub mod queries;
pub mod receipts;
pub mod sanitize;
pub mod transaction;
pub mod users;

mod error;

pub use config::{SanitizeRules, StoreConfig};
pub use database::Database;
pub use error::{ContentKind, Entity, Result, StoreError};
pub use models::*;
pub use sanitize::{is_acceptable, SanitizeHook};
pub use transaction::{FnHook, PrecommitHook};
