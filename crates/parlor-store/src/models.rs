//! Domain model structs persisted in the chat database.
//!
//! Every struct derives `Serialize` and `Deserialize` so the API layer can
//! hand it straight to its JSON encoder.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.0))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                i64::column_result(value).map(Self)
            }
        }
    };
}

id_type!(
    /// Auto-assigned, strictly positive user identifier.
    UserId
);
id_type!(ConversationId);
id_type!(GroupId);
id_type!(PhotoId);
id_type!(
    /// Sequence number scoped to a single conversation. `0` means "none".
    MessageId
);
id_type!(
    /// Sequence number scoped to a single message.
    CommentId
);

/// Full identity of a message: its sequence number plus owning conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageRef {
    pub conversation_id: ConversationId,
    pub message_id: MessageId,
}

impl MessageRef {
    pub fn new(conversation_id: ConversationId, message_id: MessageId) -> Self {
        Self {
            conversation_id,
            message_id,
        }
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.conversation_id, self.message_id)
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user as stored. Users are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    pub user_name: String,
    /// Storage path of the profile picture, if one was set.
    pub photo: Option<String>,
}

/// A user as listed by the query facade; `photo` falls back to the default path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserSummary {
    pub user_id: UserId,
    pub user_name: String,
    pub photo: String,
}

// ---------------------------------------------------------------------------
// Conversation / Group
// ---------------------------------------------------------------------------

/// One row of a user's conversation list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationPreview {
    pub conversation_id: ConversationId,
    /// Content of the last message, empty when the conversation has none.
    pub last_message_content: String,
    /// When the last message was sent, `None` when there is none.
    pub last_message_at: Option<DateTime<Utc>>,
    /// Set for group conversations.
    pub group_id: Option<GroupId>,
    /// The other participant, set for direct conversations.
    pub counterpart: Option<UserId>,
}

/// The group extension of a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub group_id: GroupId,
    pub conversation_id: ConversationId,
    pub name: String,
    pub description: Option<String>,
    pub photo: Option<String>,
}

/// Group metadata with display defaults applied.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GroupInfo {
    pub name: String,
    pub description: String,
    pub photo: String,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageRef,
    pub sender_id: UserId,
    pub content: String,
    /// Server time at insertion.
    pub sent_at: DateTime<Utc>,
    pub photo_id: Option<PhotoId>,
    pub reply_to: Option<MessageRef>,
    pub forwarded: bool,
}

/// Input for [`Database::create_message`](crate::Database::create_message).
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: &'a str,
    pub photo_id: Option<PhotoId>,
    pub reply_to: Option<MessageRef>,
}

impl<'a> NewMessage<'a> {
    pub fn text(conversation_id: ConversationId, sender_id: UserId, content: &'a str) -> Self {
        Self {
            conversation_id,
            sender_id,
            content,
            photo_id: None,
            reply_to: None,
        }
    }

    pub fn with_photo(mut self, photo_id: PhotoId) -> Self {
        self.photo_id = Some(photo_id);
        self
    }

    pub fn replying_to(mut self, target: MessageRef) -> Self {
        self.reply_to = Some(target);
        self
    }
}

/// Where a forwarded message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardTarget {
    /// An existing conversation.
    Conversation(ConversationId),
    /// A direct chat with this user, created as part of the forward.
    NewDirectChat(UserId),
}

/// Outcome of [`Database::delete_message`](crate::Database::delete_message).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDeletion {
    /// The conversation's last-message pointer after the delete (`0` if none).
    pub last_message_id: MessageId,
    /// The delete removed the conversation's final message, so the whole
    /// conversation was purged.
    pub conversation_deleted: bool,
}

/// A per-user acknowledgment of a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReadReceipt {
    pub message: MessageRef,
    pub user_id: UserId,
    pub read_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Comment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Comment {
    pub comment_id: CommentId,
    pub message: MessageRef,
    pub user_id: UserId,
    /// Commenter's name as it was when the comment was first written.
    pub user_name: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Photo
// ---------------------------------------------------------------------------

/// Metadata of an image already written to storage by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Photo {
    pub photo_id: PhotoId,
    pub path: String,
    pub size: u64,
}

/// Convert stored unix milliseconds back into a timestamp.
pub(crate) fn from_millis(idx: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(idx, millis)
    })
}
