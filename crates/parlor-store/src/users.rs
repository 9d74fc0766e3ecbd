//! User accounts.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::database::Database;
use crate::error::{not_found, Entity, Result, StoreError};
use crate::models::{User, UserId};

impl Database {
    /// Return the user called `user_name`, creating it on first sign-in.
    pub fn sign_in(&self, user_name: &str) -> Result<User> {
        let (user, created) = self.with_transaction(|tx| {
            if let Some(user) = user_by_name(tx, user_name)? {
                return Ok((user, false));
            }

            tx.execute(
                "INSERT INTO users (user_name) VALUES (?1)",
                params![user_name],
            )?;
            let user = User {
                user_id: UserId(tx.last_insert_rowid()),
                user_name: user_name.to_string(),
                photo: None,
            };
            Ok((user, true))
        })?;

        if created {
            tracing::info!(user_id = %user.user_id, "created user");
        }
        Ok(user)
    }

    pub fn find_user_by_name(&self, user_name: &str) -> Result<Option<User>> {
        self.with_conn(|conn| user_by_name(conn, user_name))
    }

    pub fn user(&self, user_id: UserId) -> Result<User> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_id, user_name, user_photo FROM users WHERE user_id = ?1",
                params![user_id],
                row_to_user,
            )
            .map_err(not_found(Entity::User(user_id)))
        })
    }

    pub fn user_name(&self, user_id: UserId) -> Result<String> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT user_name FROM users WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(not_found(Entity::User(user_id)))
        })
    }

    /// Rename a user. Fails with [`StoreError::UserNameTaken`] if another
    /// user already has `user_name`.
    pub fn set_user_name(&self, user_id: UserId, user_name: &str) -> Result<()> {
        self.with_transaction(|tx| {
            if let Some(holder) = user_by_name(tx, user_name)? {
                if holder.user_id == user_id {
                    return Ok(());
                }
                return Err(StoreError::UserNameTaken(user_name.to_string()));
            }

            let affected = tx.execute(
                "UPDATE users SET user_name = ?1 WHERE user_id = ?2",
                params![user_name, user_id],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(Entity::User(user_id)));
            }
            Ok(())
        })?;

        tracing::info!(user_id = %user_id, "renamed user");
        Ok(())
    }

    /// Point the user's profile picture at an already-stored image path.
    pub fn set_user_photo(&self, user_id: UserId, path: &str) -> Result<()> {
        self.with_transaction(|tx| {
            let affected = tx.execute(
                "UPDATE users SET user_photo = ?1 WHERE user_id = ?2",
                params![path, user_id],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound(Entity::User(user_id)));
            }
            Ok(())
        })
    }
}

fn user_by_name(conn: &Connection, user_name: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT user_id, user_name, user_photo FROM users WHERE user_name = ?1",
            params![user_name],
            row_to_user,
        )
        .optional()?;
    Ok(user)
}

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        user_id: row.get(0)?,
        user_name: row.get(1)?,
        photo: row.get(2)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_at(&dir.path().join("u.db")).unwrap();
        (dir, db)
    }

    #[test]
    fn sign_in_is_get_or_create() {
        let (_dir, db) = open();
        let first = db.sign_in("maria").unwrap();
        let again = db.sign_in("maria").unwrap();
        assert_eq!(first, again);
        assert!(first.user_id.0 > 0);
        assert_eq!(db.find_user_by_name("maria").unwrap(), Some(first));
        assert_eq!(db.find_user_by_name("nobody").unwrap(), None);
    }

    #[test]
    fn rename_respects_uniqueness() {
        let (_dir, db) = open();
        let a = db.sign_in("a").unwrap().user_id;
        db.sign_in("b").unwrap();

        assert!(matches!(
            db.set_user_name(a, "b"),
            Err(StoreError::UserNameTaken(name)) if name == "b"
        ));
        db.set_user_name(a, "a").unwrap();
        db.set_user_name(a, "c").unwrap();
        assert_eq!(db.user_name(a).unwrap(), "c");
    }

    #[test]
    fn missing_user_is_not_found() {
        let (_dir, db) = open();
        assert!(matches!(db.user(UserId(5)), Err(StoreError::NotFound(Entity::User(UserId(5))))));
        assert!(matches!(db.set_user_name(UserId(5), "x"), Err(StoreError::NotFound(_))));
        assert!(matches!(db.set_user_photo(UserId(5), "./p.png"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn photo_is_stored_as_given() {
        let (_dir, db) = open();
        let id = db.sign_in("pic").unwrap().user_id;
        assert_eq!(db.user(id).unwrap().photo, None);
        db.set_user_photo(id, "./images/me.png").unwrap();
        assert_eq!(db.user(id).unwrap().photo.as_deref(), Some("./images/me.png"));
    }
}
