use std::fmt;

use thiserror::Error;

use crate::models::{ConversationId, GroupId, MessageRef, PhotoId, UserId};

/// The record a [`StoreError::NotFound`] refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    User(UserId),
    UserName(String),
    Conversation(ConversationId),
    Group(GroupId),
    Message(MessageRef),
    Photo(PhotoId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::User(id) => write!(f, "user {id}"),
            Entity::UserName(name) => write!(f, "user named {name:?}"),
            Entity::Conversation(id) => write!(f, "conversation {id}"),
            Entity::Group(id) => write!(f, "group {id}"),
            Entity::Message(r) => write!(f, "message {r}"),
            Entity::Photo(id) => write!(f, "photo {id}"),
        }
    }
}

/// Which length limit a [`StoreError::ContentTooLong`] tripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Message,
    Comment,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Message => f.write_str("message"),
            ContentKind::Comment => f.write_str("comment"),
        }
    }
}

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Too few users to create the requested conversation kind.
    #[error("Insufficient participants: need at least {required}, got {given}")]
    InsufficientParticipants { required: usize, given: usize },

    /// A direct conversation already exists for this pair of users.
    #[error("A direct conversation between these users already exists")]
    ConversationAlreadyExists,

    #[error("User {user_id} is already a member of group {group_id}")]
    UserAlreadyInGroup { group_id: GroupId, user_id: UserId },

    #[error("{kind} content too long: {actual} characters (max {limit})")]
    ContentTooLong {
        kind: ContentKind,
        limit: usize,
        actual: usize,
    },

    /// A lookup expected a row but found none.
    #[error("Not found: {0}")]
    NotFound(Entity),

    #[error("User name already taken: {0}")]
    UserNameTaken(String),

    #[error("Photo too large: {size} bytes (max {max})")]
    PhotoTooLarge { size: u64, max: u64 },

    /// A stored value failed the sanitation policy.
    #[error("Sanitization failed for {table}.{column} (row {row_id})")]
    SanitizationFailed {
        table: String,
        column: String,
        row_id: i64,
    },

    /// A pre-commit hook rejected the transaction; it has been rolled back.
    #[error("Pre-commit hook {hook:?} failed: {source}")]
    PrecommitValidationFailed {
        hook: String,
        #[source]
        source: Box<StoreError>,
    },

    /// Rolling back after `original` failed as well.
    #[error("Rollback failed ({source}) after: {original}")]
    RollbackFailed {
        original: Box<StoreError>,
        #[source]
        source: rusqlite::Error,
    },

    /// A sanitation rule names something that is not a plain SQL identifier.
    #[error("Invalid sanitize rule: {0}")]
    InvalidSanitizeRule(String),

    /// Underlying SQLite error not otherwise classified.
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// No pooled connection could be checked out or opened.
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Map `QueryReturnedNoRows` to [`StoreError::NotFound`] for the given entity.
pub(crate) fn not_found(entity: Entity) -> impl FnOnce(rusqlite::Error) -> StoreError {
    move |e| match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound(entity),
        other => StoreError::Storage(other),
    }
}
