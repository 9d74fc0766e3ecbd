//! Group creation and membership management.

use rusqlite::{params, Connection, OptionalExtension};

use crate::constants::MIN_GROUP_PARTICIPANTS;
use crate::conversations::{distinct, ensure_users_exist, insert_conversation, purge_conversation};
use crate::database::Database;
use crate::error::{not_found, Entity, Result, StoreError};
use crate::models::{ConversationId, Group, GroupId, UserId};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create a group conversation named `name` with `user_ids` as members.
    ///
    /// The conversation, the group row and every membership row are written
    /// in one transaction.
    pub fn create_group(&self, name: &str, user_ids: &[UserId]) -> Result<Group> {
        let members = distinct(user_ids);
        if members.len() < MIN_GROUP_PARTICIPANTS {
            return Err(StoreError::InsufficientParticipants {
                required: MIN_GROUP_PARTICIPANTS,
                given: members.len(),
            });
        }

        let group = self.with_transaction(|tx| {
            let conversation_id = insert_conversation(tx, &members)?;

            tx.execute(
                "INSERT INTO chat_groups (conversation_id, name) VALUES (?1, ?2)",
                params![conversation_id, name],
            )?;
            let group_id = GroupId(tx.last_insert_rowid());

            let mut stmt =
                tx.prepare("INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)")?;
            for user_id in &members {
                stmt.execute(params![group_id, user_id])?;
            }

            Ok(Group {
                group_id,
                conversation_id,
                name: name.to_string(),
                description: None,
                photo: None,
            })
        })?;

        tracing::info!(
            group_id = %group.group_id,
            conversation_id = %group.conversation_id,
            members = members.len(),
            "created group"
        );
        Ok(group)
    }

    // ------------------------------------------------------------------
    // Membership
    // ------------------------------------------------------------------

    pub fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<()> {
        self.add_members(group_id, &[user_id])
    }

    /// Add several users at once; if any of them is already a member nothing
    /// is added.
    pub fn add_members(&self, group_id: GroupId, user_ids: &[UserId]) -> Result<()> {
        self.with_transaction(|tx| {
            let conversation_id = group_conversation(tx, group_id)?;
            ensure_users_exist(tx, user_ids)?;

            for user_id in user_ids {
                if is_member(tx, group_id, *user_id)? {
                    return Err(StoreError::UserAlreadyInGroup {
                        group_id,
                        user_id: *user_id,
                    });
                }

                tx.execute(
                    "INSERT OR IGNORE INTO participants (conversation_id, user_id) VALUES (?1, ?2)",
                    params![conversation_id, user_id],
                )?;
                tx.execute(
                    "INSERT INTO group_members (group_id, user_id) VALUES (?1, ?2)",
                    params![group_id, user_id],
                )?;
            }
            Ok(())
        })?;

        tracing::info!(group_id = %group_id, added = user_ids.len(), "added group members");
        Ok(())
    }

    /// Remove `user_id` from the group and its conversation.
    ///
    /// Returns `true` when this emptied the group, in which case the group
    /// and its conversation have been deleted.
    pub fn remove_member(&self, group_id: GroupId, user_id: UserId) -> Result<bool> {
        let group_deleted = self.with_transaction(|tx| {
            let conversation_id = group_conversation(tx, group_id)?;

            tx.execute(
                "DELETE FROM participants WHERE conversation_id = ?1 AND user_id = ?2",
                params![conversation_id, user_id],
            )?;
            tx.execute(
                "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
                params![group_id, user_id],
            )?;

            let remaining: i64 = tx.query_row(
                "SELECT COUNT(*) FROM group_members WHERE group_id = ?1",
                params![group_id],
                |row| row.get(0),
            )?;

            if remaining == 0 {
                purge_conversation(tx, conversation_id)?;
                return Ok(true);
            }
            Ok(false)
        })?;

        tracing::info!(
            group_id = %group_id,
            user_id = %user_id,
            group_deleted,
            "removed group member"
        );
        Ok(group_deleted)
    }

    // ------------------------------------------------------------------
    // Metadata
    // ------------------------------------------------------------------

    pub fn set_group_name(&self, group_id: GroupId, name: &str) -> Result<()> {
        self.update_group_column(group_id, "name", Some(name))
    }

    pub fn set_group_description(
        &self,
        group_id: GroupId,
        description: Option<&str>,
    ) -> Result<()> {
        self.update_group_column(group_id, "description", description)
    }

    /// Point the group picture at an already-stored image path.
    pub fn set_group_photo(&self, group_id: GroupId, path: &str) -> Result<()> {
        self.update_group_column(group_id, "photo", Some(path))
    }

    /// Fetch a group row as stored (no display defaults).
    pub fn group(&self, group_id: GroupId) -> Result<Group> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT group_id, conversation_id, name, description, photo
                 FROM chat_groups WHERE group_id = ?1",
                params![group_id],
                |row| {
                    Ok(Group {
                        group_id: row.get(0)?,
                        conversation_id: row.get(1)?,
                        name: row.get(2)?,
                        description: row.get(3)?,
                        photo: row.get(4)?,
                    })
                },
            )
            .map_err(not_found(Entity::Group(group_id)))
        })
    }

    /// The group attached to a conversation, if it is a group conversation.
    pub fn group_for_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> Result<Option<GroupId>> {
        self.with_conn(|conn| group_for_conversation(conn, conversation_id))
    }

    // `column` is always one of the literals above.
    fn update_group_column(
        &self,
        group_id: GroupId,
        column: &str,
        value: Option<&str>,
    ) -> Result<()> {
        self.with_transaction(|tx| {
            let affected = tx.execute(
                &format!("UPDATE chat_groups SET {column} = ?1 WHERE group_id = ?2"),
                params![value, group_id],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(Entity::Group(group_id)));
            }
            Ok(())
        })
    }
}

pub(crate) fn group_conversation(conn: &Connection, group_id: GroupId) -> Result<ConversationId> {
    conn.query_row(
        "SELECT conversation_id FROM chat_groups WHERE group_id = ?1",
        params![group_id],
        |row| row.get(0),
    )
    .map_err(not_found(Entity::Group(group_id)))
}

pub(crate) fn group_for_conversation(
    conn: &Connection,
    conversation_id: ConversationId,
) -> Result<Option<GroupId>> {
    let id = conn
        .query_row(
            "SELECT group_id FROM chat_groups WHERE conversation_id = ?1",
            params![conversation_id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id)
}

fn is_member(conn: &Connection, group_id: GroupId, user_id: UserId) -> Result<bool> {
    let found = conn
        .prepare_cached("SELECT 1 FROM group_members WHERE group_id = ?1 AND user_id = ?2")?
        .exists(params![group_id, user_id])?;
    Ok(found)
}
