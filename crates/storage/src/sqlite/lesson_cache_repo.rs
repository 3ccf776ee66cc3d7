use async_trait::async_trait;
use sqlx::Row;
use zenith_core::model::{QuizContent, QuizId, QuizQuestion, VideoRef};

use crate::repository::{LessonCache, StorageError};

use super::SqliteRepository;
use super::mapping::{column_err, from_json, now_rfc3339, query_err, to_json};

#[async_trait]
impl LessonCache for SqliteRepository {
    async fn get_quiz(&self, video: &VideoRef) -> Result<Option<QuizContent>, StorageError> {
        let Some(url) = video.as_url() else {
            return Ok(None);
        };
        let row = sqlx::query("SELECT quiz_id, questions FROM quiz_cache WHERE video_url = ?1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let quiz_id: String = row.try_get("quiz_id").map_err(column_err)?;
        let questions: String = row.try_get("questions").map_err(column_err)?;
        let questions: Vec<QuizQuestion> = from_json(&questions)?;
        Ok(Some(QuizContent {
            quiz_id: QuizId::new(quiz_id),
            questions,
        }))
    }

    async fn put_quiz(&self, video: &VideoRef, quiz: &QuizContent) -> Result<(), StorageError> {
        let Some(url) = video.as_url() else {
            return Ok(());
        };
        sqlx::query(
            r"
            INSERT INTO quiz_cache (video_url, quiz_id, questions, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(video_url) DO UPDATE SET
                quiz_id = excluded.quiz_id,
                questions = excluded.questions,
                updated_at = excluded.updated_at
            ",
        )
        .bind(url)
        .bind(quiz.quiz_id.as_str())
        .bind(to_json(&quiz.questions)?)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn get_transcript(&self, video: &VideoRef) -> Result<Option<String>, StorageError> {
        let Some(url) = video.as_url() else {
            return Ok(None);
        };
        let row = sqlx::query("SELECT transcript FROM transcript_cache WHERE video_url = ?1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(query_err)?;

        row.map(|row| row.try_get::<String, _>("transcript").map_err(column_err))
            .transpose()
    }

    async fn put_transcript(&self, video: &VideoRef, transcript: &str) -> Result<(), StorageError> {
        let Some(url) = video.as_url() else {
            return Ok(());
        };
        sqlx::query(
            r"
            INSERT INTO transcript_cache (video_url, transcript, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(video_url) DO UPDATE SET
                transcript = excluded.transcript,
                updated_at = excluded.updated_at
            ",
        )
        .bind(url)
        .bind(transcript)
        .bind(now_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(())
    }
}
