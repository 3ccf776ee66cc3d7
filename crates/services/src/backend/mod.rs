//! Remote course backend: saved course plans, progress, quiz generation and
//! grading, and per-video study material.

mod http;
mod memory;
mod wire;

use async_trait::async_trait;
use serde_json::Value;
use zenith_core::model::{CourseState, QuizContent, QuizGrade, QuizId, VideoRef};
use zenith_core::progress::ProgressSnapshot;

use crate::error::BackendError;

pub use http::HttpBackend;
pub use memory::{BackendCall, InMemoryBackend};

/// Inputs for generating a quiz from a lesson transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizRequest {
    pub course_title: String,
    pub video: VideoRef,
    pub transcript: String,
}

/// A completed attempt, answers in question order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizSubmission {
    pub course_title: String,
    pub quiz_id: QuizId,
    pub answers: Vec<String>,
    /// Global id of the graded lesson.
    pub video_no: Option<u32>,
    pub total_videos: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRequest {
    pub video: VideoRef,
    pub transcript: String,
    pub summary_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MindmapRequest {
    pub course_title: String,
    pub video: VideoRef,
    pub transcript: String,
    pub title: String,
    /// Regenerate instead of returning the backend's cached tree.
    pub force: bool,
}

/// Outcome of a transcript lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptReply {
    Ready(String),
    /// Extraction was queued server-side; ask again later.
    Processing,
    Unavailable,
}

/// Operations the progression engine needs from the course backend.
///
/// Every call requires a signed-in identity.
#[async_trait]
pub trait CourseBackend: Send + Sync {
    /// Saved plan and roadmap of a course, `None` when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport, auth, or decoding failures.
    async fn load_course_state(&self, course_title: &str)
    -> Result<Option<CourseState>, BackendError>;

    /// Authoritative progress snapshot, `None` when nothing was saved yet.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport, auth, or decoding failures.
    async fn load_progress(&self, course_title: &str)
    -> Result<Option<ProgressSnapshot>, BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError` on transport or auth failures.
    async fn save_progress(
        &self,
        course_title: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError` when generation fails or yields no quiz id.
    async fn generate_quiz(&self, request: &QuizRequest) -> Result<QuizContent, BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError`; an expired quiz id is reported as a rejection
    /// matching [`BackendError::is_expired_quiz`].
    async fn submit_quiz(&self, submission: &QuizSubmission) -> Result<QuizGrade, BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError` on transport or auth failures.
    async fn fetch_transcript(&self, video: &VideoRef) -> Result<TranscriptReply, BackendError>;

    /// # Errors
    ///
    /// Returns `BackendError` on transport or auth failures.
    async fn summarize(&self, request: &SummaryRequest) -> Result<String, BackendError>;

    /// Mindmap tree for a lesson; the tree is opaque to the engine.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or auth failures.
    async fn generate_mindmap(&self, request: &MindmapRequest) -> Result<Value, BackendError>;

    /// Record that the lesson video was fully completed.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` on transport or auth failures.
    async fn mark_completed(&self, course_title: &str, video: &VideoRef)
    -> Result<(), BackendError>;
}
