//! Per-lesson study material: transcript, summary, and mindmap.
//!
//! Results are tagged with the [`LessonToken`] that was current when the
//! request started so the player can drop replies for a lesson the learner
//! already left.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use storage::LessonCache;
use tracing::warn;
use zenith_core::gating::LessonToken;
use zenith_core::model::VideoRef;

use crate::backend::{CourseBackend, MindmapRequest, SummaryRequest, TranscriptReply};
use crate::error::PlayerError;

pub const TRANSCRIPT_PROCESSING: &str =
    "Transcript is being processed. Please try again in a moment.";
pub const TRANSCRIPT_UNAVAILABLE: &str = "Transcript not available";

/// A value produced for the lesson identified by `token`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tagged<T> {
    token: LessonToken,
    value: T,
}

impl<T> Tagged<T> {
    #[must_use]
    pub fn new(token: LessonToken, value: T) -> Self {
        Self { token, value }
    }

    #[must_use]
    pub fn token(&self) -> LessonToken {
        self.token
    }

    #[must_use]
    pub fn value(&self) -> &T {
        &self.value
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.value
    }
}

/// Snapshot of the open lesson taken when a content request starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonContext {
    pub token: LessonToken,
    pub course_title: String,
    pub video: VideoRef,
    pub topic: String,
    pub summary_type: String,
}

/// Loads study material, remembering it per video for the session so a
/// revisited lesson does not refetch it. Transcripts also go to the
/// persistent lesson cache.
#[derive(Clone)]
pub struct ContentService {
    backend: Arc<dyn CourseBackend>,
    lessons: Arc<dyn LessonCache>,
    // (video url, summary type) -> summary
    summaries: Arc<Mutex<HashMap<(String, String), String>>>,
    mindmaps: Arc<Mutex<HashMap<String, Value>>>,
}

fn memo_get<K, V>(memo: &Mutex<HashMap<K, V>>, key: &K) -> Option<V>
where
    K: std::hash::Hash + Eq,
    V: Clone,
{
    memo.lock().ok().and_then(|guard| guard.get(key).cloned())
}

fn memo_put<K, V>(memo: &Mutex<HashMap<K, V>>, key: K, value: V)
where
    K: std::hash::Hash + Eq,
{
    if let Ok(mut guard) = memo.lock() {
        guard.insert(key, value);
    }
}

impl ContentService {
    #[must_use]
    pub fn new(backend: Arc<dyn CourseBackend>, lessons: Arc<dyn LessonCache>) -> Self {
        Self {
            backend,
            lessons,
            summaries: Arc::default(),
            mindmaps: Arc::default(),
        }
    }

    /// Cached transcript for `video`, without touching the backend.
    pub async fn cached_transcript(&self, video: &VideoRef) -> Option<String> {
        match self.lessons.get_transcript(video).await {
            Ok(text) => text.filter(|text| !text.is_empty()),
            Err(err) => {
                warn!(video = %video.as_str(), error = %err, "transcript cache unreadable");
                None
            }
        }
    }

    /// Transcript from the cache, else from the backend. Ready transcripts
    /// are cached.
    ///
    /// # Errors
    ///
    /// `PlayerError::NoVideo` for lessons without a video, or the backend error.
    pub async fn transcript(
        &self,
        lesson: &LessonContext,
    ) -> Result<Tagged<TranscriptReply>, PlayerError> {
        if lesson.video.as_url().is_none() {
            return Err(PlayerError::NoVideo);
        }
        if let Some(text) = self.cached_transcript(&lesson.video).await {
            return Ok(Tagged::new(lesson.token, TranscriptReply::Ready(text)));
        }

        let reply = self.backend.fetch_transcript(&lesson.video).await?;
        if let TranscriptReply::Ready(text) = &reply {
            if let Err(err) = self.lessons.put_transcript(&lesson.video, text).await {
                warn!(video = %lesson.video.as_str(), error = %err, "transcript cache write failed");
            }
        }
        Ok(Tagged::new(lesson.token, reply))
    }

    /// # Errors
    ///
    /// `PlayerError::NoVideo`, `PlayerError::TranscriptMissing` when
    /// `transcript` is blank, or the backend error.
    pub async fn summary(
        &self,
        lesson: &LessonContext,
        transcript: &str,
    ) -> Result<Tagged<String>, PlayerError> {
        if lesson.video.as_url().is_none() {
            return Err(PlayerError::NoVideo);
        }
        if transcript.trim().is_empty() {
            return Err(PlayerError::TranscriptMissing);
        }
        let memo_key = (
            lesson.video.as_str().to_owned(),
            lesson.summary_type.clone(),
        );
        if let Some(summary) = memo_get(&self.summaries, &memo_key) {
            return Ok(Tagged::new(lesson.token, summary));
        }
        let summary = self
            .backend
            .summarize(&SummaryRequest {
                video: lesson.video.clone(),
                transcript: transcript.to_owned(),
                summary_type: lesson.summary_type.clone(),
            })
            .await?;
        memo_put(&self.summaries, memo_key, summary.clone());
        Ok(Tagged::new(lesson.token, summary))
    }

    /// Mindmap tree for the lesson; `force` bypasses the session memo and
    /// asks the backend to regenerate.
    ///
    /// # Errors
    ///
    /// `PlayerError::NoVideo`, or the backend error.
    pub async fn mindmap(
        &self,
        lesson: &LessonContext,
        transcript: &str,
        force: bool,
    ) -> Result<Tagged<Value>, PlayerError> {
        if lesson.video.as_url().is_none() {
            return Err(PlayerError::NoVideo);
        }
        let url = lesson.video.as_str().to_owned();
        if !force {
            if let Some(tree) = memo_get(&self.mindmaps, &url) {
                return Ok(Tagged::new(lesson.token, tree));
            }
        }
        let title = match lesson.topic.trim() {
            "" => "Mindmap",
            topic => topic,
        };
        let tree = self
            .backend
            .generate_mindmap(&MindmapRequest {
                course_title: lesson.course_title.clone(),
                video: lesson.video.clone(),
                transcript: transcript.to_owned(),
                title: title.to_owned(),
                force,
            })
            .await?;
        memo_put(&self.mindmaps, url, tree.clone());
        Ok(Tagged::new(lesson.token, tree))
    }
}
