//! Photo metadata. Image bytes are written by the caller; only the storage
//! path and size are recorded here.

use rusqlite::params;

use crate::constants::MAX_PHOTO_BYTES;
use crate::database::Database;
use crate::error::{not_found, Entity, Result, StoreError};
use crate::models::{Photo, PhotoId};

impl Database {
    /// Record a stored image. `size` must be below [`MAX_PHOTO_BYTES`].
    pub fn insert_photo(&self, path: &str, size: u64) -> Result<PhotoId> {
        if size >= MAX_PHOTO_BYTES {
            return Err(StoreError::PhotoTooLarge {
                size,
                max: MAX_PHOTO_BYTES,
            });
        }

        let photo_id = self.with_transaction(|tx| {
            tx.execute(
                "INSERT INTO photos (path, size) VALUES (?1, ?2)",
                params![path, size as i64],
            )?;
            Ok(PhotoId(tx.last_insert_rowid()))
        })?;

        tracing::debug!(photo_id = %photo_id, size, "recorded photo");
        Ok(photo_id)
    }

    pub fn photo(&self, photo_id: PhotoId) -> Result<Photo> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT photo_id, path, size FROM photos WHERE photo_id = ?1",
                params![photo_id],
                |row| {
                    let size: i64 = row.get(2)?;
                    Ok(Photo {
                        photo_id: row.get(0)?,
                        path: row.get(1)?,
                        size: size as u64,
                    })
                },
            )
            .map_err(not_found(Entity::Photo(photo_id)))
        })
    }

    pub fn photo_path(&self, photo_id: PhotoId) -> Result<String> {
        Ok(self.photo(photo_id)?.path)
    }
}
