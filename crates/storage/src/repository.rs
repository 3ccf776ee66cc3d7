use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use zenith_core::model::{QuizContent, VideoRef};
use zenith_core::progress::ProgressSnapshot;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Owner of a cached progress record: one entry per `(user, course)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    user_id: String,
    course_title: String,
}

impl CacheKey {
    /// Signed-out users share the `"guest"` slot; blank titles map to `"Course"`.
    #[must_use]
    pub fn new(user_id: Option<&str>, course_title: &str) -> Self {
        let user_id = user_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .unwrap_or("guest");
        let course_title = match course_title.trim() {
            "" => "Course",
            title => title,
        };
        Self {
            user_id: user_id.to_owned(),
            course_title: course_title.to_owned(),
        }
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn course_title(&self) -> &str {
        &self.course_title
    }
}

/// Local fast cache of course progress.
///
/// Serves as the provisional view at first paint and as the offline fallback
/// when the remote store cannot be reached.
#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Fetch the cached snapshot, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_progress(&self, key: &CacheKey) -> Result<Option<ProgressSnapshot>, StorageError>;

    /// Replace the cached snapshot.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be stored.
    async fn put_progress(
        &self,
        key: &CacheKey,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError>;
}

/// Per-video caches that survive navigation: generated quizzes and transcripts.
///
/// Lessons without a video (`VideoRef::Missing`) are never cached.
#[async_trait]
pub trait LessonCache: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on connection or decoding failures.
    async fn get_quiz(&self, video: &VideoRef) -> Result<Option<QuizContent>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the quiz cannot be stored.
    async fn put_quiz(&self, video: &VideoRef, quiz: &QuizContent) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on connection failures.
    async fn get_transcript(&self, video: &VideoRef) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the transcript cannot be stored.
    async fn put_transcript(&self, video: &VideoRef, transcript: &str) -> Result<(), StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    progress: Arc<Mutex<HashMap<CacheKey, ProgressSnapshot>>>,
    quizzes: Arc<Mutex<HashMap<String, QuizContent>>>,
    transcripts: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(err: std::sync::PoisonError<T>) -> StorageError {
    StorageError::Connection(err.to_string())
}

#[async_trait]
impl ProgressCache for InMemoryRepository {
    async fn get_progress(&self, key: &CacheKey) -> Result<Option<ProgressSnapshot>, StorageError> {
        let guard = self.progress.lock().map_err(poisoned)?;
        Ok(guard.get(key).cloned())
    }

    async fn put_progress(
        &self,
        key: &CacheKey,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError> {
        let mut guard = self.progress.lock().map_err(poisoned)?;
        guard.insert(key.clone(), snapshot.clone());
        Ok(())
    }
}

#[async_trait]
impl LessonCache for InMemoryRepository {
    async fn get_quiz(&self, video: &VideoRef) -> Result<Option<QuizContent>, StorageError> {
        let Some(url) = video.as_url() else {
            return Ok(None);
        };
        let guard = self.quizzes.lock().map_err(poisoned)?;
        Ok(guard.get(url).cloned())
    }

    async fn put_quiz(&self, video: &VideoRef, quiz: &QuizContent) -> Result<(), StorageError> {
        let Some(url) = video.as_url() else {
            return Ok(());
        };
        let mut guard = self.quizzes.lock().map_err(poisoned)?;
        guard.insert(url.to_owned(), quiz.clone());
        Ok(())
    }

    async fn get_transcript(&self, video: &VideoRef) -> Result<Option<String>, StorageError> {
        let Some(url) = video.as_url() else {
            return Ok(None);
        };
        let guard = self.transcripts.lock().map_err(poisoned)?;
        Ok(guard.get(url).cloned())
    }

    async fn put_transcript(&self, video: &VideoRef, transcript: &str) -> Result<(), StorageError> {
        let Some(url) = video.as_url() else {
            return Ok(());
        };
        let mut guard = self.transcripts.lock().map_err(poisoned)?;
        guard.insert(url.to_owned(), transcript.to_owned());
        Ok(())
    }
}

/// Aggregates cache repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub progress: Arc<dyn ProgressCache>,
    pub lessons: Arc<dyn LessonCache>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let progress: Arc<dyn ProgressCache> = Arc::new(repo.clone());
        let lessons: Arc<dyn LessonCache> = Arc::new(repo);
        Self { progress, lessons }
    }
}
