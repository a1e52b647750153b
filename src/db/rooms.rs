//! Room catalog repository.

use crate::db::DbError;
use sqlx::SqlitePool;

/// One active room as listed to clients.
#[derive(Debug, Clone)]
pub struct RoomRow {
    pub name: String,
    pub created_by: String,
    pub created_at: String,
}

/// Repository for room and membership rows.
pub struct RoomCatalog<'a> {
    pool: &'a SqlitePool,
}

impl<'a> RoomCatalog<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a room. The UNIQUE constraint on `name` also covers
    /// soft-deleted rows, so a deleted room's name is not reusable.
    pub async fn create(&self, name: &str, created_by: &str) -> Result<(), DbError> {
        let result = sqlx::query("INSERT INTO rooms (name, created_by) VALUES (?, ?)")
            .bind(name)
            .bind(created_by)
            .execute(self.pool)
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(DbError::RoomExists(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Soft-delete a room and drop all of its membership rows. Returns
    /// false if no active room had that name.
    pub async fn delete(&self, name: &str) -> Result<bool, DbError> {
        let updated = sqlx::query("UPDATE rooms SET is_active = 0 WHERE name = ? AND is_active = 1")
            .bind(name)
            .execute(self.pool)
            .await?;
        if updated.rows_affected() == 0 {
            return Ok(false);
        }
        sqlx::query("DELETE FROM user_rooms WHERE room_name = ?")
            .bind(name)
            .execute(self.pool)
            .await?;
        Ok(true)
    }

    /// All active rooms, ordered by name.
    pub async fn list_active(&self) -> Result<Vec<RoomRow>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, String)>(
            "SELECT name, created_by, created_at FROM rooms WHERE is_active = 1 ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(name, created_by, created_at)| RoomRow {
                name,
                created_by,
                created_at,
            })
            .collect())
    }

    /// Names of all active rooms (for the in-memory existence cache).
    pub async fn active_names(&self) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query_as::<_, (String,)>("SELECT name FROM rooms WHERE is_active = 1")
            .fetch_all(self.pool)
            .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Record a membership; idempotent.
    pub async fn join(&self, username: &str, room: &str) -> Result<(), DbError> {
        sqlx::query("INSERT OR IGNORE INTO user_rooms (username, room_name) VALUES (?, ?)")
            .bind(username)
            .bind(room)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Drop a membership row; idempotent.
    pub async fn leave(&self, username: &str, room: &str) -> Result<(), DbError> {
        sqlx::query("DELETE FROM user_rooms WHERE username = ? AND room_name = ?")
            .bind(username)
            .bind(room)
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Prior memberships of an identity, restricted to active rooms.
    pub async fn rooms_of(&self, username: &str) -> Result<Vec<String>, DbError> {
        let rows = sqlx::query_as::<_, (String,)>(
            r#"
            SELECT ur.room_name FROM user_rooms ur
            JOIN rooms r ON ur.room_name = r.name
            WHERE ur.username = ? AND r.is_active = 1
            ORDER BY ur.joined_at, ur.id
            "#,
        )
        .bind(username)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    /// Rewrite membership rows for an identity rename.
    pub async fn rename_user(&self, old: &str, new: &str) -> Result<(), DbError> {
        sqlx::query("UPDATE user_rooms SET username = ? WHERE username = ?")
            .bind(new)
            .bind(old)
            .execute(self.pool)
            .await?;
        Ok(())
    }
}
