//! Message creation, forwarding, deletion and lookup.
//!
//! Message ids are sequence numbers scoped to their conversation. They are
//! allocated as `MAX(message_id) + 1` inside the same `BEGIN IMMEDIATE`
//! transaction as the insert, so concurrent writers never collide.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::constants::{MAX_MESSAGE_CHARS, PHOTO_PLACEHOLDER};
use crate::conversations::{
    conversation_exists, ensure_users_exist, insert_conversation, purge_conversation,
};
use crate::database::Database;
use crate::error::{not_found, ContentKind, Entity, Result, StoreError};
use crate::models::{
    from_millis, ConversationId, ForwardTarget, Message, MessageDeletion, MessageId, MessageRef,
    NewMessage, PhotoId, UserId,
};

const MESSAGE_COLUMNS: &str = "conversation_id, message_id, sender_id, content, sent_at, photo_id,
     replied_conversation_id, replied_message_id, forwarded";

impl Database {
    /// Store a new message and advance the conversation's last-message pointer.
    ///
    /// Returns the message id allocated within the conversation.
    pub fn create_message(&self, message: NewMessage<'_>) -> Result<MessageId> {
        let message_id = self.with_transaction(|tx| insert_message(tx, &message, false))?;
        tracing::info!(
            conversation_id = %message.conversation_id,
            message_id = %message_id,
            sender_id = %message.sender_id,
            "created message"
        );
        Ok(message_id)
    }

    /// Copy a message's content and photo into another conversation as
    /// `sender_id`, optionally opening a new direct chat first.
    ///
    /// Both steps happen in one transaction. Forwarding to a user who
    /// already shares a direct chat with the sender through
    /// [`ForwardTarget::NewDirectChat`] fails with
    /// [`StoreError::ConversationAlreadyExists`].
    pub fn forward_message(
        &self,
        original: MessageRef,
        sender_id: UserId,
        target: ForwardTarget,
    ) -> Result<MessageRef> {
        let forwarded = self.with_transaction(|tx| {
            let (content, photo_id): (String, Option<PhotoId>) = tx
                .query_row(
                    "SELECT content, photo_id FROM messages
                     WHERE conversation_id = ?1 AND message_id = ?2",
                    params![original.conversation_id, original.message_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .map_err(not_found(Entity::Message(original)))?;

            let conversation_id = match target {
                ForwardTarget::Conversation(id) => id,
                ForwardTarget::NewDirectChat(user_id) => {
                    insert_conversation(tx, &[sender_id, user_id])?
                }
            };

            let message = NewMessage {
                conversation_id,
                sender_id,
                content: &content,
                photo_id,
                reply_to: None,
            };
            let message_id = insert_message(tx, &message, true)?;
            Ok(MessageRef::new(conversation_id, message_id))
        })?;

        tracing::info!(
            from = %original,
            to = %forwarded,
            sender_id = %sender_id,
            "forwarded message"
        );
        Ok(forwarded)
    }

    /// Delete a message together with its comments and read receipts.
    ///
    /// Replies pointing at it lose their reply reference. When this removes
    /// the conversation's final message the whole conversation is purged.
    pub fn delete_message(&self, target: MessageRef) -> Result<MessageDeletion> {
        let outcome = self.with_transaction(|tx| {
            let conversation_id = target.conversation_id;
            let message_id = target.message_id;

            tx.execute(
                "DELETE FROM comments WHERE conversation_id = ?1 AND message_id = ?2",
                params![conversation_id, message_id],
            )?;
            tx.execute(
                "DELETE FROM read_receipts WHERE conversation_id = ?1 AND message_id = ?2",
                params![conversation_id, message_id],
            )?;
            tx.execute(
                "UPDATE messages SET replied_conversation_id = NULL, replied_message_id = NULL
                 WHERE replied_conversation_id = ?1 AND replied_message_id = ?2",
                params![conversation_id, message_id],
            )?;

            let deleted = tx.execute(
                "DELETE FROM messages WHERE conversation_id = ?1 AND message_id = ?2",
                params![conversation_id, message_id],
            )?;
            if deleted == 0 {
                return Err(StoreError::NotFound(Entity::Message(target)));
            }

            let last: Option<MessageId> = tx
                .query_row(
                    "SELECT message_id FROM messages WHERE conversation_id = ?1
                     ORDER BY sent_at DESC, message_id DESC LIMIT 1",
                    params![conversation_id],
                    |row| row.get(0),
                )
                .optional()?;

            match last {
                Some(last_message_id) => {
                    tx.execute(
                        "UPDATE conversations SET last_message_id = ?1 WHERE conversation_id = ?2",
                        params![last_message_id, conversation_id],
                    )?;
                    Ok(MessageDeletion {
                        last_message_id,
                        conversation_deleted: false,
                    })
                }
                None => {
                    purge_conversation(tx, conversation_id)?;
                    Ok(MessageDeletion {
                        last_message_id: MessageId(0),
                        conversation_deleted: true,
                    })
                }
            }
        })?;

        tracing::info!(
            message = %target,
            last_message_id = %outcome.last_message_id,
            conversation_deleted = outcome.conversation_deleted,
            "deleted message"
        );
        Ok(outcome)
    }

    pub fn get_message(&self, target: MessageRef) -> Result<Message> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages
                     WHERE conversation_id = ?1 AND message_id = ?2"
                ),
                params![target.conversation_id, target.message_id],
                row_to_message,
            )
            .map_err(not_found(Entity::Message(target)))
        })
    }

    /// All messages of a conversation, oldest first.
    pub fn list_messages(&self, conversation_id: ConversationId) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            if !conversation_exists(conn, conversation_id)? {
                return Err(StoreError::NotFound(Entity::Conversation(conversation_id)));
            }

            let mut stmt = conn.prepare(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages
                 WHERE conversation_id = ?1
                 ORDER BY sent_at ASC, message_id ASC"
            ))?;
            let rows = stmt.query_map(params![conversation_id], row_to_message)?;

            let mut messages = Vec::new();
            for row in rows {
                messages.push(row?);
            }
            Ok(messages)
        })
    }
}

/// Insert a message inside an open transaction and return its id.
pub(crate) fn insert_message(
    conn: &Connection,
    message: &NewMessage<'_>,
    forwarded: bool,
) -> Result<MessageId> {
    check_length(message.content)?;

    let conversation_id = message.conversation_id;
    if !conversation_exists(conn, conversation_id)? {
        return Err(StoreError::NotFound(Entity::Conversation(conversation_id)));
    }
    ensure_users_exist(conn, &[message.sender_id])?;

    if let Some(photo_id) = message.photo_id {
        let found = conn
            .prepare_cached("SELECT 1 FROM photos WHERE photo_id = ?1")?
            .exists(params![photo_id])?;
        if !found {
            return Err(StoreError::NotFound(Entity::Photo(photo_id)));
        }
    }

    if let Some(reply) = message.reply_to {
        if !message_exists(conn, reply)? {
            return Err(StoreError::NotFound(Entity::Message(reply)));
        }
    }

    let content = if message.content.is_empty() && message.photo_id.is_some() {
        PHOTO_PLACEHOLDER
    } else {
        message.content
    };

    let message_id = next_message_id(conn, conversation_id)?;
    let sent_at = Utc::now().timestamp_millis();

    conn.execute(
        "INSERT INTO messages
            (conversation_id, message_id, sender_id, content, sent_at, photo_id,
             replied_conversation_id, replied_message_id, forwarded)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            conversation_id,
            message_id,
            message.sender_id,
            content,
            sent_at,
            message.photo_id,
            message.reply_to.map(|r| r.conversation_id),
            message.reply_to.map(|r| r.message_id),
            forwarded,
        ],
    )?;

    conn.execute(
        "UPDATE conversations SET last_message_id = ?1 WHERE conversation_id = ?2",
        params![message_id, conversation_id],
    )?;

    tracing::debug!(
        conversation_id = %conversation_id,
        message_id = %message_id,
        "allocated message id"
    );
    Ok(message_id)
}

pub(crate) fn message_exists(conn: &Connection, target: MessageRef) -> Result<bool> {
    let found = conn
        .prepare_cached("SELECT 1 FROM messages WHERE conversation_id = ?1 AND message_id = ?2")?
        .exists(params![target.conversation_id, target.message_id])?;
    Ok(found)
}

fn next_message_id(conn: &Connection, conversation_id: ConversationId) -> Result<MessageId> {
    let id = conn.query_row(
        "SELECT COALESCE(MAX(message_id), 0) + 1 FROM messages WHERE conversation_id = ?1",
        params![conversation_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn check_length(content: &str) -> Result<()> {
    let actual = content.chars().count();
    if actual > MAX_MESSAGE_CHARS {
        return Err(StoreError::ContentTooLong {
            kind: ContentKind::Message,
            limit: MAX_MESSAGE_CHARS,
            actual,
        });
    }
    Ok(())
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    let replied_conversation: Option<ConversationId> = row.get(6)?;
    let replied_message: Option<MessageId> = row.get(7)?;

    Ok(Message {
        id: MessageRef::new(row.get(0)?, row.get(1)?),
        sender_id: row.get(2)?,
        content: row.get(3)?,
        sent_at: from_millis(4, row.get(4)?)?,
        photo_id: row.get(5)?,
        reply_to: replied_conversation
            .zip(replied_message)
            .map(|(c, m)| MessageRef::new(c, m)),
        forwarded: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Database, UserId, UserId, ConversationId) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("m.db")).unwrap();
        let a = db.sign_in("alice").unwrap().user_id;
        let b = db.sign_in("bob").unwrap().user_id;
        let conv = db.create_conversation(&[a, b]).unwrap();
        (dir, db, a, b, conv)
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
            .unwrap()
    }

    #[test]
    fn ids_are_sequential_per_conversation() {
        let (_dir, db, a, b, conv) = setup();
        let c = db.sign_in("carol").unwrap().user_id;
        let other = db.create_conversation(&[a, c]).unwrap();

        assert_eq!(db.create_message(NewMessage::text(conv, a, "one")).unwrap(), MessageId(1));
        assert_eq!(db.create_message(NewMessage::text(conv, b, "two")).unwrap(), MessageId(2));
        assert_eq!(db.create_message(NewMessage::text(other, a, "first")).unwrap(), MessageId(1));
        assert_eq!(db.last_message_id(conv).unwrap(), MessageId(2));
    }

    #[test]
    fn too_long_content_is_rejected() {
        let (_dir, db, a, _b, conv) = setup();
        let long = "x".repeat(MAX_MESSAGE_CHARS + 1);
        assert!(matches!(
            db.create_message(NewMessage::text(conv, a, &long)),
            Err(StoreError::ContentTooLong {
                kind: ContentKind::Message,
                limit: 1000,
                actual: 1001,
            })
        ));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM messages"), 0);

        // The limit counts characters, not bytes.
        let emoji = "\u{1F600}".repeat(MAX_MESSAGE_CHARS);
        assert!(db.create_message(NewMessage::text(conv, a, &emoji)).is_ok());
    }

    #[test]
    fn unknown_conversation_is_not_found() {
        let (_dir, db, a, _b, _conv) = setup();
        assert!(matches!(
            db.create_message(NewMessage::text(ConversationId(42), a, "hi")),
            Err(StoreError::NotFound(Entity::Conversation(ConversationId(42))))
        ));
    }

    #[test]
    fn photo_message_gets_placeholder_content() {
        let (_dir, db, a, _b, conv) = setup();
        let photo = db.insert_photo("./images/p1.png", 1024).unwrap();

        let id = db
            .create_message(NewMessage::text(conv, a, "").with_photo(photo))
            .unwrap();
        let stored = db.get_message(MessageRef::new(conv, id)).unwrap();
        assert_eq!(stored.content, PHOTO_PLACEHOLDER);
        assert_eq!(stored.photo_id, Some(photo));

        assert!(matches!(
            db.create_message(NewMessage::text(conv, a, "").with_photo(PhotoId(99))),
            Err(StoreError::NotFound(Entity::Photo(PhotoId(99))))
        ));
    }

    #[test]
    fn reply_reference_is_stored_and_validated() {
        let (_dir, db, a, b, conv) = setup();
        let first = db.create_message(NewMessage::text(conv, a, "question")).unwrap();
        let target = MessageRef::new(conv, first);

        let reply = db
            .create_message(NewMessage::text(conv, b, "answer").replying_to(target))
            .unwrap();
        assert_eq!(db.get_message(MessageRef::new(conv, reply)).unwrap().reply_to, Some(target));

        let missing = MessageRef::new(conv, MessageId(50));
        assert!(matches!(
            db.create_message(NewMessage::text(conv, b, "?").replying_to(missing)),
            Err(StoreError::NotFound(Entity::Message(_)))
        ));
    }

    #[test]
    fn deleting_a_message_recomputes_last_pointer() {
        let (_dir, db, a, b, conv) = setup();
        let first = db.create_message(NewMessage::text(conv, a, "one")).unwrap();
        let second = db
            .create_message(
                NewMessage::text(conv, b, "two").replying_to(MessageRef::new(conv, first)),
            )
            .unwrap();
        db.comment_message(MessageRef::new(conv, second), a, "nice").unwrap();
        db.read_message(MessageRef::new(conv, second), a).unwrap();

        let outcome = db.delete_message(MessageRef::new(conv, second)).unwrap();
        assert_eq!(outcome.last_message_id, first);
        assert!(!outcome.conversation_deleted);
        assert_eq!(db.last_message_id(conv).unwrap(), first);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM comments"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM read_receipts"), 0);
    }

    fn insert_at(db: &Database, conv: ConversationId, sender: UserId, id: i64, sent_at: i64) {
        db.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO messages (conversation_id, message_id, sender_id, content, sent_at)
                 VALUES (?1, ?2, ?3, 'x', ?4)",
                params![conv, MessageId(id), sender, sent_at],
            )?;
            tx.execute(
                "UPDATE conversations SET last_message_id = ?1 WHERE conversation_id = ?2",
                params![MessageId(id), conv],
            )?;
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn delete_recompute_breaks_sent_at_ties_by_highest_id() {
        let (_dir, db, a, b, conv) = setup();
        insert_at(&db, conv, a, 1, 1_000);
        insert_at(&db, conv, b, 2, 1_000);
        insert_at(&db, conv, a, 3, 1_000);

        let outcome = db.delete_message(MessageRef::new(conv, MessageId(3))).unwrap();
        assert_eq!(outcome.last_message_id, MessageId(2));
        assert_eq!(db.last_message_id(conv).unwrap(), MessageId(2));
    }

    #[test]
    fn delete_recompute_prefers_latest_sent_at_over_highest_id() {
        let (_dir, db, a, b, conv) = setup();
        insert_at(&db, conv, a, 1, 5_000);
        insert_at(&db, conv, b, 2, 1_000);
        insert_at(&db, conv, a, 3, 2_000);

        let outcome = db.delete_message(MessageRef::new(conv, MessageId(3))).unwrap();
        assert_eq!(outcome.last_message_id, MessageId(1));
        assert_eq!(db.last_message_id(conv).unwrap(), MessageId(1));
    }

    #[test]
    fn deleting_a_replied_message_clears_the_reference() {
        let (_dir, db, a, b, conv) = setup();
        let first = db.create_message(NewMessage::text(conv, a, "one")).unwrap();
        let reply = db
            .create_message(
                NewMessage::text(conv, b, "re").replying_to(MessageRef::new(conv, first)),
            )
            .unwrap();

        db.delete_message(MessageRef::new(conv, first)).unwrap();
        let stored = db.get_message(MessageRef::new(conv, reply)).unwrap();
        assert_eq!(stored.reply_to, None);
    }

    #[test]
    fn deleting_last_message_purges_conversation() {
        let (_dir, db, a, b, conv) = setup();
        let only = db.create_message(NewMessage::text(conv, a, "bye")).unwrap();

        let outcome = db.delete_message(MessageRef::new(conv, only)).unwrap();
        assert!(outcome.conversation_deleted);
        assert_eq!(outcome.last_message_id, MessageId(0));
        assert!(!db.conversation_exists(conv).unwrap());
        assert_eq!(count(&db, "SELECT COUNT(*) FROM participants"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM direct_pairs"), 0);

        assert!(db.create_conversation(&[a, b]).is_ok());
    }

    #[test]
    fn deleting_missing_message_is_not_found() {
        let (_dir, db, _a, _b, conv) = setup();
        assert!(matches!(
            db.delete_message(MessageRef::new(conv, MessageId(1))),
            Err(StoreError::NotFound(Entity::Message(_)))
        ));
    }

    #[test]
    fn forward_into_existing_conversation() {
        let (_dir, db, a, b, conv) = setup();
        let c = db.sign_in("carol").unwrap().user_id;
        let other = db.create_conversation(&[b, c]).unwrap();
        let photo = db.insert_photo("./images/cat.png", 10).unwrap();
        let original = db
            .create_message(NewMessage::text(conv, a, "look").with_photo(photo))
            .unwrap();

        let copy = db
            .forward_message(MessageRef::new(conv, original), b, ForwardTarget::Conversation(other))
            .unwrap();
        assert_eq!(copy, MessageRef::new(other, MessageId(1)));

        let stored = db.get_message(copy).unwrap();
        assert_eq!(stored.content, "look");
        assert_eq!(stored.photo_id, Some(photo));
        assert_eq!(stored.sender_id, b);
        assert!(stored.forwarded);
        assert_eq!(stored.reply_to, None);
    }

    #[test]
    fn forward_to_new_direct_chat() {
        let (_dir, db, a, _b, conv) = setup();
        let c = db.sign_in("carol").unwrap().user_id;
        let original = db.create_message(NewMessage::text(conv, a, "fyi")).unwrap();

        let copy = db
            .forward_message(MessageRef::new(conv, original), a, ForwardTarget::NewDirectChat(c))
            .unwrap();
        assert_eq!(db.find_direct_conversation(a, c).unwrap(), Some(copy.conversation_id));

        // A second forward to the same user fails and writes nothing.
        let messages_before = count(&db, "SELECT COUNT(*) FROM messages");
        assert!(matches!(
            db.forward_message(MessageRef::new(conv, original), a, ForwardTarget::NewDirectChat(c)),
            Err(StoreError::ConversationAlreadyExists)
        ));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM messages"), messages_before);
    }

    #[test]
    fn list_messages_in_order() {
        let (_dir, db, a, b, conv) = setup();
        db.create_message(NewMessage::text(conv, a, "one")).unwrap();
        db.create_message(NewMessage::text(conv, b, "two")).unwrap();

        let contents: Vec<_> = db
            .list_messages(conv)
            .unwrap()
            .into_iter()
            .map(|m| m.content)
            .collect();
        assert_eq!(contents, vec!["one", "two"]);
    }
}
