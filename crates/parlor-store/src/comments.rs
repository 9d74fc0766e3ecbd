//! Message comments. A user holds at most one comment per message.

use rusqlite::{params, OptionalExtension};

use crate::constants::MAX_COMMENT_CHARS;
use crate::database::Database;
use crate::error::{not_found, ContentKind, Entity, Result, StoreError};
use crate::messages::message_exists;
use crate::models::{Comment, CommentId, MessageRef, UserId};

impl Database {
    /// Comment on `target` as `user_id`.
    ///
    /// A second comment by the same user replaces the content of the first
    /// and keeps its id and the name recorded when it was written.
    pub fn comment_message(
        &self,
        target: MessageRef,
        user_id: UserId,
        content: &str,
    ) -> Result<CommentId> {
        let actual = content.chars().count();
        if actual > MAX_COMMENT_CHARS {
            return Err(StoreError::ContentTooLong {
                kind: ContentKind::Comment,
                limit: MAX_COMMENT_CHARS,
                actual,
            });
        }

        self.with_transaction(|tx| {
            if !message_exists(tx, target)? {
                return Err(StoreError::NotFound(Entity::Message(target)));
            }

            let existing: Option<CommentId> = tx
                .query_row(
                    "SELECT comment_id FROM comments
                     WHERE conversation_id = ?1 AND message_id = ?2 AND user_id = ?3",
                    params![target.conversation_id, target.message_id, user_id],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(comment_id) = existing {
                tx.execute(
                    "UPDATE comments SET content = ?1
                     WHERE conversation_id = ?2 AND message_id = ?3 AND comment_id = ?4",
                    params![content, target.conversation_id, target.message_id, comment_id],
                )?;
                tracing::debug!(message = %target, comment_id = %comment_id, "updated comment");
                return Ok(comment_id);
            }

            let user_name: String = tx
                .query_row(
                    "SELECT user_name FROM users WHERE user_id = ?1",
                    params![user_id],
                    |row| row.get(0),
                )
                .map_err(not_found(Entity::User(user_id)))?;

            let comment_id: CommentId = tx.query_row(
                "SELECT COALESCE(MAX(comment_id), 0) + 1 FROM comments
                 WHERE conversation_id = ?1 AND message_id = ?2",
                params![target.conversation_id, target.message_id],
                |row| row.get(0),
            )?;

            tx.execute(
                "INSERT INTO comments
                    (conversation_id, message_id, comment_id, user_id, user_name, content)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    target.conversation_id,
                    target.message_id,
                    comment_id,
                    user_id,
                    user_name,
                    content
                ],
            )?;
            tracing::debug!(message = %target, comment_id = %comment_id, "inserted comment");
            Ok(comment_id)
        })
    }

    /// Delete `user_id`'s comment on `target`. Returns the number of rows
    /// removed; removing a comment that does not exist is not an error.
    pub fn remove_comment(&self, user_id: UserId, target: MessageRef) -> Result<usize> {
        self.with_transaction(|tx| {
            let removed = tx.execute(
                "DELETE FROM comments
                 WHERE conversation_id = ?1 AND message_id = ?2 AND user_id = ?3",
                params![target.conversation_id, target.message_id, user_id],
            )?;
            Ok(removed)
        })
    }

    /// Comments on `target` in the order they were first written.
    pub fn list_comments(&self, target: MessageRef) -> Result<Vec<Comment>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT comment_id, user_id, user_name, content FROM comments
                 WHERE conversation_id = ?1 AND message_id = ?2
                 ORDER BY comment_id",
            )?;
            let rows = stmt.query_map(
                params![target.conversation_id, target.message_id],
                |row| {
                    Ok(Comment {
                        comment_id: row.get(0)?,
                        message: target,
                        user_id: row.get(1)?,
                        user_name: row.get(2)?,
                        content: row.get(3)?,
                    })
                },
            )?;

            let mut comments = Vec::new();
            for row in rows {
                comments.push(row?);
            }
            Ok(comments)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageId, NewMessage};

    fn setup() -> (tempfile::TempDir, Database, UserId, UserId, MessageRef) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("cm.db")).unwrap();
        let a = db.sign_in("alice").unwrap().user_id;
        let b = db.sign_in("bob").unwrap().user_id;
        let conv = db.create_conversation(&[a, b]).unwrap();
        let id = db.create_message(NewMessage::text(conv, a, "pic")).unwrap();
        (dir, db, a, b, MessageRef::new(conv, id))
    }

    #[test]
    fn second_comment_replaces_first() {
        let (_dir, db, _a, b, msg) = setup();
        let first = db.comment_message(msg, b, "nice").unwrap();
        let second = db.comment_message(msg, b, "very nice").unwrap();
        assert_eq!(first, second);

        let comments = db.list_comments(msg).unwrap();
        assert_eq!(comments.len(), 1);
        assert_eq!(comments[0].content, "very nice");
        assert_eq!(comments[0].comment_id, first);
    }

    #[test]
    fn comment_ids_are_scoped_per_message() {
        let (_dir, db, a, b, msg) = setup();
        assert_eq!(db.comment_message(msg, b, "1").unwrap(), CommentId(1));
        assert_eq!(db.comment_message(msg, a, "2").unwrap(), CommentId(2));

        let other_id = db
            .create_message(NewMessage::text(msg.conversation_id, b, "again"))
            .unwrap();
        let other = MessageRef::new(msg.conversation_id, other_id);
        assert_eq!(db.comment_message(other, a, "3").unwrap(), CommentId(1));

        let names: Vec<_> = db
            .list_comments(msg)
            .unwrap()
            .into_iter()
            .map(|c| c.user_name)
            .collect();
        assert_eq!(names, vec!["bob", "alice"]);
    }

    #[test]
    fn name_is_recorded_at_write_time() {
        let (_dir, db, _a, b, msg) = setup();
        db.comment_message(msg, b, "hey").unwrap();
        db.set_user_name(b, "robert").unwrap();
        db.comment_message(msg, b, "hey again").unwrap();
        assert_eq!(db.list_comments(msg).unwrap()[0].user_name, "bob");
    }

    #[test]
    fn over_long_comment_is_rejected() {
        let (_dir, db, _a, b, msg) = setup();
        let long = "y".repeat(MAX_COMMENT_CHARS + 1);
        assert!(matches!(
            db.comment_message(msg, b, &long),
            Err(StoreError::ContentTooLong { kind: ContentKind::Comment, limit: 20, .. })
        ));
        assert!(db.list_comments(msg).unwrap().is_empty());
    }

    #[test]
    fn comment_on_missing_message_is_not_found() {
        let (_dir, db, _a, b, msg) = setup();
        let missing = MessageRef::new(msg.conversation_id, MessageId(7));
        assert!(matches!(
            db.comment_message(missing, b, "?"),
            Err(StoreError::NotFound(Entity::Message(_)))
        ));
    }

    #[test]
    fn remove_comment_is_idempotent() {
        let (_dir, db, _a, b, msg) = setup();
        db.comment_message(msg, b, "bye").unwrap();
        assert_eq!(db.remove_comment(b, msg).unwrap(), 1);
        assert_eq!(db.remove_comment(b, msg).unwrap(), 0);
        assert!(db.list_comments(msg).unwrap().is_empty());
    }
}
