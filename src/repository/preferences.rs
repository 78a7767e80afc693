//! Per-user preferences and bookmarks repository

use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::preference::{Bookmark, Preference},
};

#[derive(Clone)]
pub struct PreferencesRepository {
    pool: Pool<Postgres>,
}

impl PreferencesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    // =========================================================================
    // PREFERENCES
    // =========================================================================

    pub async fn list(&self, user_id: Uuid) -> AppResult<Vec<Preference>> {
        let prefs = sqlx::query_as::<_, Preference>(
            "SELECT key, value, updated_at FROM preferences WHERE user_id = $1 ORDER BY key",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(prefs)
    }

    pub async fn get(&self, user_id: Uuid, key: &str) -> AppResult<Preference> {
        sqlx::query_as::<_, Preference>(
            "SELECT key, value, updated_at FROM preferences WHERE user_id = $1 AND key = $2",
        )
        .bind(user_id)
        .bind(key)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Preference '{}' not found", key)))
    }

    /// Insert or replace a preference value
    pub async fn set(&self, user_id: Uuid, key: &str, value: &serde_json::Value) -> AppResult<Preference> {
        let pref = sqlx::query_as::<_, Preference>(
            r#"
            INSERT INTO preferences (user_id, key, value, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id, key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING key, value, updated_at
            "#,
        )
        .bind(user_id)
        .bind(key)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;
        Ok(pref)
    }

    pub async fn delete(&self, user_id: Uuid, key: &str) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM preferences WHERE user_id = $1 AND key = $2")
            .bind(user_id)
            .bind(key)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Preference '{}' not found", key)));
        }
        Ok(())
    }

    // =========================================================================
    // BOOKMARKS
    // =========================================================================

    /// Bookmarked book ids, newest first
    pub async fn bookmarked_ids(&self, user_id: Uuid) -> AppResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            "SELECT book_id FROM bookmarks WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    /// Add a bookmark; adding an existing one is a no-op
    pub async fn add_bookmark(&self, user_id: Uuid, book_id: Uuid) -> AppResult<Bookmark> {
        sqlx::query(
            r#"
            INSERT INTO bookmarks (user_id, book_id, created_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id, book_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(book_id)
        .execute(&self.pool)
        .await?;

        let bookmark = sqlx::query_as::<_, Bookmark>(
            "SELECT user_id, book_id, created_at FROM bookmarks WHERE user_id = $1 AND book_id = $2",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(bookmark)
    }

    pub async fn remove_bookmark(&self, user_id: Uuid, book_id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = $1 AND book_id = $2")
            .bind(user_id)
            .bind(book_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Book {} is not bookmarked", book_id)));
        }
        Ok(())
    }
}
