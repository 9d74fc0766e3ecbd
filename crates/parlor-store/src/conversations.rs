//! Conversation creation, direct-chat deduplication and purging.

use rusqlite::{params, Connection, OptionalExtension};

use crate::constants::DIRECT_PARTICIPANTS;
use crate::database::Database;
use crate::error::{not_found, Entity, Result, StoreError};
use crate::models::{ConversationId, MessageId, UserId};

impl Database {
    /// Create a conversation among `user_ids`.
    ///
    /// Duplicate ids are ignored. Two distinct users make a direct
    /// conversation, which fails with [`StoreError::ConversationAlreadyExists`]
    /// if the pair already has one.
    pub fn create_conversation(&self, user_ids: &[UserId]) -> Result<ConversationId> {
        let conversation_id = self.with_transaction(|tx| insert_conversation(tx, user_ids))?;
        tracing::info!(
            conversation_id = %conversation_id,
            participants = user_ids.len(),
            "created conversation"
        );
        Ok(conversation_id)
    }

    /// The direct conversation between `a` and `b`, if one exists.
    pub fn find_direct_conversation(&self, a: UserId, b: UserId) -> Result<Option<ConversationId>> {
        self.with_conn(|conn| find_direct_conversation(conn, a, b))
    }

    /// Current last-message pointer of a conversation (`0` when empty).
    pub fn last_message_id(&self, conversation_id: ConversationId) -> Result<MessageId> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT last_message_id FROM conversations WHERE conversation_id = ?1",
                params![conversation_id],
                |row| row.get(0),
            )
            .map_err(not_found(Entity::Conversation(conversation_id)))
        })
    }

    pub fn conversation_exists(&self, conversation_id: ConversationId) -> Result<bool> {
        self.with_conn(|conn| conversation_exists(conn, conversation_id))
    }
}

/// Insert a conversation and its participants inside an open transaction.
pub(crate) fn insert_conversation(
    conn: &Connection,
    user_ids: &[UserId],
) -> Result<ConversationId> {
    let users = distinct(user_ids);
    if users.len() < DIRECT_PARTICIPANTS {
        return Err(StoreError::InsufficientParticipants {
            required: DIRECT_PARTICIPANTS,
            given: users.len(),
        });
    }

    if users.len() == DIRECT_PARTICIPANTS
        && find_direct_conversation(conn, users[0], users[1])?.is_some()
    {
        return Err(StoreError::ConversationAlreadyExists);
    }

    ensure_users_exist(conn, &users)?;

    conn.execute("INSERT INTO conversations (last_message_id) VALUES (0)", [])?;
    let conversation_id = ConversationId(conn.last_insert_rowid());

    let mut stmt =
        conn.prepare("INSERT INTO participants (conversation_id, user_id) VALUES (?1, ?2)")?;
    for user_id in &users {
        stmt.execute(params![conversation_id, user_id])?;
    }

    if users.len() == DIRECT_PARTICIPANTS {
        let (low, high) = ordered_pair(users[0], users[1]);
        conn.execute(
            "INSERT INTO direct_pairs (user_low, user_high, conversation_id) VALUES (?1, ?2, ?3)",
            params![low, high, conversation_id],
        )?;
    }

    tracing::debug!(conversation_id = %conversation_id, "inserted conversation rows");
    Ok(conversation_id)
}

/// A conversation with exactly `a` and `b` as participants and no group.
pub(crate) fn find_direct_conversation(
    conn: &Connection,
    a: UserId,
    b: UserId,
) -> Result<Option<ConversationId>> {
    let id = conn
        .query_row(
            "SELECT p.conversation_id FROM participants p
             WHERE p.conversation_id NOT IN (SELECT conversation_id FROM chat_groups)
               AND p.conversation_id IN
                   (SELECT conversation_id FROM participants WHERE user_id = ?1)
               AND p.conversation_id IN
                   (SELECT conversation_id FROM participants WHERE user_id = ?2)
             GROUP BY p.conversation_id
             HAVING COUNT(p.user_id) = 2
             LIMIT 1",
            params![a, b],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

pub(crate) fn conversation_exists(
    conn: &Connection,
    conversation_id: ConversationId,
) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM conversations WHERE conversation_id = ?1",
            params![conversation_id],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn ensure_users_exist(conn: &Connection, user_ids: &[UserId]) -> Result<()> {
    let mut stmt = conn.prepare("SELECT 1 FROM users WHERE user_id = ?1")?;
    for user_id in user_ids {
        if !stmt.exists(params![user_id])? {
            return Err(StoreError::NotFound(Entity::User(*user_id)));
        }
    }
    Ok(())
}

/// Delete a conversation and everything hanging off it.
///
/// Replies elsewhere that point into this conversation lose their reply
/// reference. Must run inside a transaction.
pub(crate) fn purge_conversation(conn: &Connection, conversation_id: ConversationId) -> Result<()> {
    conn.execute(
        "UPDATE messages SET replied_conversation_id = NULL, replied_message_id = NULL
         WHERE replied_conversation_id = ?1",
        params![conversation_id],
    )?;
    conn.execute(
        "DELETE FROM read_receipts WHERE conversation_id = ?1",
        params![conversation_id],
    )?;
    conn.execute(
        "DELETE FROM comments WHERE conversation_id = ?1",
        params![conversation_id],
    )?;
    conn.execute(
        "DELETE FROM messages WHERE conversation_id = ?1",
        params![conversation_id],
    )?;
    conn.execute(
        "DELETE FROM group_members WHERE group_id IN
            (SELECT group_id FROM chat_groups WHERE conversation_id = ?1)",
        params![conversation_id],
    )?;
    conn.execute(
        "DELETE FROM chat_groups WHERE conversation_id = ?1",
        params![conversation_id],
    )?;
    conn.execute(
        "DELETE FROM direct_pairs WHERE conversation_id = ?1",
        params![conversation_id],
    )?;
    conn.execute(
        "DELETE FROM participants WHERE conversation_id = ?1",
        params![conversation_id],
    )?;
    conn.execute(
        "DELETE FROM conversations WHERE conversation_id = ?1",
        params![conversation_id],
    )?;

    tracing::info!(conversation_id = %conversation_id, "purged conversation");
    Ok(())
}

pub(crate) fn distinct(user_ids: &[UserId]) -> Vec<UserId> {
    let mut out = Vec::with_capacity(user_ids.len());
    for id in user_ids {
        if !out.contains(id) {
            out.push(*id);
        }
    }
    out
}

fn ordered_pair(a: UserId, b: UserId) -> (UserId, UserId) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (tempfile::TempDir, Database, Vec<UserId>) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("c.db")).unwrap();
        let users = ["alice", "bob", "carol"]
            .iter()
            .map(|name| db.sign_in(name).unwrap().user_id)
            .collect();
        (dir, db, users)
    }

    fn count(db: &Database, sql: &str) -> i64 {
        db.with_conn(|conn| Ok(conn.query_row(sql, [], |row| row.get(0))?))
            .unwrap()
    }

    #[test]
    fn fewer_than_two_users_is_rejected() {
        let (_dir, db, users) = setup();
        assert!(matches!(
            db.create_conversation(&[users[0]]),
            Err(StoreError::InsufficientParticipants { required: 2, given: 1 })
        ));
        // A user listed twice is still one participant.
        assert!(matches!(
            db.create_conversation(&[users[0], users[0]]),
            Err(StoreError::InsufficientParticipants { given: 1, .. })
        ));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversations"), 0);
    }

    #[test]
    fn direct_conversation_is_unique_per_unordered_pair() {
        let (_dir, db, users) = setup();
        let id = db.create_conversation(&[users[0], users[1]]).unwrap();

        assert!(matches!(
            db.create_conversation(&[users[0], users[1]]),
            Err(StoreError::ConversationAlreadyExists)
        ));
        assert!(matches!(
            db.create_conversation(&[users[1], users[0]]),
            Err(StoreError::ConversationAlreadyExists)
        ));

        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversations"), 1);
        assert_eq!(db.find_direct_conversation(users[1], users[0]).unwrap(), Some(id));
        assert_eq!(db.last_message_id(id).unwrap().0, 0);
    }

    #[test]
    fn pair_index_row_only_for_two_party_conversations() {
        let (_dir, db, users) = setup();
        db.create_conversation(&users).unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM direct_pairs"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM participants"), 3);

        db.create_conversation(&[users[0], users[2]]).unwrap();
        assert_eq!(count(&db, "SELECT COUNT(*) FROM direct_pairs"), 1);
    }

    #[test]
    fn unknown_user_rolls_back_everything() {
        let (_dir, db, users) = setup();
        let result = db.create_conversation(&[users[0], UserId(999)]);
        assert!(matches!(result, Err(StoreError::NotFound(Entity::User(UserId(999))))));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM conversations"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM participants"), 0);
    }

    #[test]
    fn conversation_exists_reflects_creation() {
        let (_dir, db, users) = setup();
        assert!(!db.conversation_exists(ConversationId(1)).unwrap());
        let id = db.create_conversation(&[users[0], users[1]]).unwrap();
        assert!(db.conversation_exists(id).unwrap());
    }
}
