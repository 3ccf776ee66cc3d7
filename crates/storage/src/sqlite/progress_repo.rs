use async_trait::async_trait;
use sqlx::Row;
use zenith_core::progress::ProgressSnapshot;

use crate::repository::{CacheKey, ProgressCache, StorageError};

use super::SqliteRepository;
use super::mapping::{column_err, from_json, now_rfc3339, query_err, to_json};

#[async_trait]
impl ProgressCache for SqliteRepository {
    async fn get_progress(&self, key: &CacheKey) -> Result<Option<ProgressSnapshot>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT snapshot
            FROM course_progress
            WHERE user_id = ?1 AND course_title = ?2
            ",
        )
        .bind(key.user_id())
        .bind(key.course_title())
        .fetch_optional(&self.pool)
        .await
        .map_err(query_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let raw: String = row.try_get("snapshot").map_err(column_err)?;
        from_json(&raw).map(Some)
    }

    async fn put_progress(
        &self,
        key: &CacheKey,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO course_progress (user_id, course_title, snapshot, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(user_id, course_title) DO UPDATE SET
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at
            ",
        )
        .bind(key.user_id())
        .bind(key.course_title())
        .bind(to_json(snapshot)?)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(())
    }
}
