//! Read-only lookups backing the conversation list, member pickers and
//! profile views. Missing pictures fall back to the configured default path.

use rusqlite::{params, Connection, Params};

use crate::conversations::conversation_exists;
use crate::database::Database;
use crate::error::{not_found, Entity, Result, StoreError};
use crate::groups::group_for_conversation;
use crate::models::{
    from_millis, ConversationId, ConversationPreview, GroupId, GroupInfo, UserId, UserSummary,
};

impl Database {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Every user, in id order.
    pub fn list_users(&self) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            self.user_summaries(
                conn,
                "SELECT user_id, user_name, IFNULL(user_photo, ?1) FROM users ORDER BY user_id",
                params![self.default_photo],
            )
        })
    }

    /// Users who are not participants of `conversation_id`, for "add member"
    /// pickers.
    pub fn users_not_in_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            self.user_summaries(
                conn,
                "SELECT user_id, user_name, IFNULL(user_photo, ?1) FROM users
                 WHERE user_id NOT IN
                    (SELECT user_id FROM participants WHERE conversation_id = ?2)
                 ORDER BY user_id",
                params![self.default_photo, conversation_id],
            )
        })
    }

    pub fn conversation_participants(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            if !conversation_exists(conn, conversation_id)? {
                return Err(StoreError::NotFound(Entity::Conversation(conversation_id)));
            }
            self.user_summaries(
                conn,
                "SELECT u.user_id, u.user_name, IFNULL(u.user_photo, ?1)
                 FROM users u JOIN participants p ON p.user_id = u.user_id
                 WHERE p.conversation_id = ?2
                 ORDER BY u.user_id",
                params![self.default_photo, conversation_id],
            )
        })
    }

    pub fn group_members(&self, group_id: GroupId) -> Result<Vec<UserSummary>> {
        self.with_conn(|conn| {
            let members = self.user_summaries(
                conn,
                "SELECT u.user_id, u.user_name, IFNULL(u.user_photo, ?1)
                 FROM users u JOIN group_members g ON g.user_id = u.user_id
                 WHERE g.group_id = ?2
                 ORDER BY u.user_id",
                params![self.default_photo, group_id],
            )?;
            // Groups are deleted once empty, so no members means no group.
            if members.is_empty() {
                return Err(StoreError::NotFound(Entity::Group(group_id)));
            }
            Ok(members)
        })
    }

    pub fn user_photo(&self, user_id: UserId) -> Result<String> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT IFNULL(user_photo, ?1) FROM users WHERE user_id = ?2",
                params![self.default_photo, user_id],
                |row| row.get(0),
            )
            .map_err(not_found(Entity::User(user_id)))
        })
    }

    // ------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------

    pub fn group_photo(&self, group_id: GroupId) -> Result<String> {
        Ok(self.group_info(group_id)?.photo)
    }

    /// Group metadata with an empty description and the default picture
    /// standing in for unset values.
    pub fn group_info(&self, group_id: GroupId) -> Result<GroupInfo> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, IFNULL(description, ''), IFNULL(photo, ?1)
                 FROM chat_groups WHERE group_id = ?2",
                params![self.default_photo, group_id],
                |row| {
                    Ok(GroupInfo {
                        name: row.get(0)?,
                        description: row.get(1)?,
                        photo: row.get(2)?,
                    })
                },
            )
            .map_err(not_found(Entity::Group(group_id)))
        })
    }

    // ------------------------------------------------------------------
    // Conversations
    // ------------------------------------------------------------------

    /// Display name of a conversation as seen by `viewer`: the group name,
    /// or the other participant's user name for a direct chat.
    pub fn conversation_name(
        &self,
        conversation_id: ConversationId,
        viewer: UserId,
    ) -> Result<String> {
        self.with_conn(|conn| match group_for_conversation(conn, conversation_id)? {
            Some(group_id) => conn
                .query_row(
                    "SELECT name FROM chat_groups WHERE group_id = ?1",
                    params![group_id],
                    |row| row.get(0),
                )
                .map_err(not_found(Entity::Group(group_id))),
            None => conn
                .query_row(
                    "SELECT u.user_name FROM users u
                     JOIN participants p ON p.user_id = u.user_id
                     WHERE p.conversation_id = ?1 AND p.user_id != ?2
                     LIMIT 1",
                    params![conversation_id, viewer],
                    |row| row.get(0),
                )
                .map_err(not_found(Entity::Conversation(conversation_id))),
        })
    }

    /// Picture of a conversation as seen by `viewer`: the group picture, or
    /// the other participant's profile picture for a direct chat.
    pub fn conversation_photo(
        &self,
        conversation_id: ConversationId,
        viewer: UserId,
    ) -> Result<String> {
        self.with_conn(|conn| match group_for_conversation(conn, conversation_id)? {
            Some(group_id) => conn
                .query_row(
                    "SELECT IFNULL(photo, ?1) FROM chat_groups WHERE group_id = ?2",
                    params![self.default_photo, group_id],
                    |row| row.get(0),
                )
                .map_err(not_found(Entity::Group(group_id))),
            None => conn
                .query_row(
                    "SELECT IFNULL(u.user_photo, ?1) FROM users u
                     JOIN participants p ON p.user_id = u.user_id
                     WHERE p.conversation_id = ?2 AND p.user_id != ?3
                     LIMIT 1",
                    params![self.default_photo, conversation_id, viewer],
                    |row| row.get(0),
                )
                .map_err(not_found(Entity::Conversation(conversation_id))),
        })
    }

    /// Conversations `user_id` takes part in, most recently active first.
    /// Conversations without messages come last.
    pub fn list_conversations(&self, user_id: UserId) -> Result<Vec<ConversationPreview>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.conversation_id,
                        IFNULL(m.content, ''),
                        m.sent_at,
                        g.group_id,
                        (SELECT o.user_id FROM participants o
                         WHERE o.conversation_id = c.conversation_id AND o.user_id != ?1
                           AND g.group_id IS NULL
                         LIMIT 1)
                 FROM conversations c
                 JOIN participants p
                   ON p.conversation_id = c.conversation_id AND p.user_id = ?1
                 LEFT JOIN messages m
                   ON m.conversation_id = c.conversation_id AND m.message_id = c.last_message_id
                 LEFT JOIN chat_groups g ON g.conversation_id = c.conversation_id
                 ORDER BY m.sent_at IS NULL, m.sent_at DESC, c.conversation_id DESC",
            )?;

            let rows = stmt.query_map(params![user_id], |row| {
                let sent_at: Option<i64> = row.get(2)?;
                Ok(ConversationPreview {
                    conversation_id: row.get(0)?,
                    last_message_content: row.get(1)?,
                    last_message_at: sent_at.map(|ms| from_millis(2, ms)).transpose()?,
                    group_id: row.get(3)?,
                    counterpart: row.get(4)?,
                })
            })?;

            let mut previews = Vec::new();
            for row in rows {
                previews.push(row?);
            }
            Ok(previews)
        })
    }

    fn user_summaries<P: Params>(
        &self,
        conn: &Connection,
        sql: &str,
        params: P,
    ) -> Result<Vec<UserSummary>> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(UserSummary {
                user_id: row.get(0)?,
                user_name: row.get(1)?,
                photo: row.get(2)?,
            })
        })?;

        let mut users = Vec::new();
        for row in rows {
            users.push(row?);
        }
        Ok(users)
    }
}
