//! Read receipts.

use chrono::Utc;
use rusqlite::{params, Connection};

use crate::database::Database;
use crate::error::{not_found, Entity, Result};
use crate::models::{from_millis, MessageRef, ReadReceipt, UserId};

impl Database {
    /// Record that `user_id` has read `target`.
    ///
    /// Returns `true` if a receipt was stored. Reading a message twice, or
    /// reading one's own message, stores nothing and is not an error.
    pub fn read_message(&self, target: MessageRef, user_id: UserId) -> Result<bool> {
        self.with_transaction(|tx| {
            let sender = sender_of(tx, target)?;
            if sender == user_id {
                tracing::debug!(message = %target, user_id = %user_id, "sender receipt suppressed");
                return Ok(false);
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO read_receipts (conversation_id, message_id, user_id, read_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    target.conversation_id,
                    target.message_id,
                    user_id,
                    Utc::now().timestamp_millis()
                ],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Whether every participant except the sender has read `target`.
    ///
    /// Compares the number of distinct receipt authors with the number of
    /// current participants other than the sender. Receipts from users who
    /// have since left still count, so after a reader leaves a group this
    /// can be `false` while [`Database::unread_by`] is empty.
    pub fn has_been_read(&self, target: MessageRef) -> Result<bool> {
        self.with_conn(|conn| {
            let sender = sender_of(conn, target)?;

            let readers: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT user_id) FROM read_receipts
                 WHERE conversation_id = ?1 AND message_id = ?2",
                params![target.conversation_id, target.message_id],
                |row| row.get(0),
            )?;
            let audience: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT user_id) FROM participants
                 WHERE conversation_id = ?1 AND user_id != ?2",
                params![target.conversation_id, sender],
                |row| row.get(0),
            )?;

            Ok(readers == audience)
        })
    }

    /// Participants other than the sender who have read `target`.
    pub fn read_by(&self, target: MessageRef) -> Result<Vec<UserId>> {
        self.audience(target, true)
    }

    /// Participants other than the sender who have not read `target` yet.
    pub fn unread_by(&self, target: MessageRef) -> Result<Vec<UserId>> {
        self.audience(target, false)
    }

    pub fn read_receipts(&self, target: MessageRef) -> Result<Vec<ReadReceipt>> {
        self.with_conn(|conn| {
            sender_of(conn, target)?;

            let mut stmt = conn.prepare(
                "SELECT user_id, read_at FROM read_receipts
                 WHERE conversation_id = ?1 AND message_id = ?2
                 ORDER BY read_at, user_id",
            )?;
            let rows = stmt.query_map(
                params![target.conversation_id, target.message_id],
                |row| {
                    Ok(ReadReceipt {
                        message: target,
                        user_id: row.get(0)?,
                        read_at: from_millis(1, row.get(1)?)?,
                    })
                },
            )?;

            let mut receipts = Vec::new();
            for row in rows {
                receipts.push(row?);
            }
            Ok(receipts)
        })
    }

    fn audience(&self, target: MessageRef, has_read: bool) -> Result<Vec<UserId>> {
        self.with_conn(|conn| {
            let sender = sender_of(conn, target)?;
            let membership = if has_read { "IN" } else { "NOT IN" };

            let mut stmt = conn.prepare(&format!(
                "SELECT user_id FROM participants
                 WHERE conversation_id = ?1 AND user_id != ?2
                   AND user_id {membership} (
                       SELECT user_id FROM read_receipts
                       WHERE conversation_id = ?1 AND message_id = ?3)
                 ORDER BY user_id"
            ))?;
            let rows = stmt.query_map(
                params![target.conversation_id, sender, target.message_id],
                |row| row.get(0),
            )?;

            let mut users = Vec::new();
            for row in rows {
                users.push(row?);
            }
            Ok(users)
        })
    }
}

fn sender_of(conn: &Connection, target: MessageRef) -> Result<UserId> {
    conn.query_row(
        "SELECT sender_id FROM messages WHERE conversation_id = ?1 AND message_id = ?2",
        params![target.conversation_id, target.message_id],
        |row| row.get(0),
    )
    .map_err(not_found(Entity::Message(target)))
}
