use std::sync::Arc;

use storage::LessonCache;
use tracing::{info, warn};
use zenith_core::model::{QuizContent, QuizGrade, VideoRef};

use crate::backend::{CourseBackend, QuizRequest, QuizSubmission};
use crate::content::Tagged;
use crate::error::BackendError;

/// Grade of a submitted attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub grade: QuizGrade,
    /// Quiz regenerated because the backend had forgotten the submitted id.
    pub regenerated: Option<QuizContent>,
}

/// Quiz generation and grading against the backend, with a per-video cache
/// so a revisited lesson shows its last quiz instantly.
#[derive(Clone)]
pub struct QuizFlow {
    backend: Arc<dyn CourseBackend>,
    lessons: Arc<dyn LessonCache>,
}

impl QuizFlow {
    #[must_use]
    pub fn new(backend: Arc<dyn CourseBackend>, lessons: Arc<dyn LessonCache>) -> Self {
        Self { backend, lessons }
    }

    /// Last quiz generated for `video`, if cached and non-empty.
    pub async fn cached(&self, video: &VideoRef) -> Option<QuizContent> {
        match self.lessons.get_quiz(video).await {
            Ok(quiz) => quiz.filter(|quiz| !quiz.is_empty()),
            Err(err) => {
                warn!(video = %video.as_str(), error = %err, "quiz cache unreadable");
                None
            }
        }
    }

    /// Generate a fresh quiz and cache it for the video.
    ///
    /// # Errors
    ///
    /// Returns `BackendError` if generation fails.
    pub async fn generate(&self, request: &QuizRequest) -> Result<QuizContent, BackendError> {
        let quiz = self.backend.generate_quiz(request).await?;
        self.remember(&request.video, &quiz).await;
        Ok(quiz)
    }

    /// Generate for a lesson that started a quiz earlier; the reply keeps
    /// that lesson's token so a learner who moved on never sees it.
    pub async fn refresh(
        &self,
        request: Tagged<QuizRequest>,
    ) -> Tagged<Result<QuizContent, BackendError>> {
        let token = request.token();
        Tagged::new(token, self.generate(request.value()).await)
    }

    /// Submit answers, regenerating the quiz and retrying once when the
    /// backend reports the quiz id as expired.
    ///
    /// # Errors
    ///
    /// Returns the submit error, or the expiry error itself when
    /// regeneration fails.
    pub async fn submit(
        &self,
        submission: QuizSubmission,
        regenerate: &QuizRequest,
        shown: &QuizContent,
    ) -> Result<SubmitOutcome, BackendError> {
        let expired = match self.backend.submit_quiz(&submission).await {
            Ok(grade) => {
                return Ok(SubmitOutcome {
                    grade,
                    regenerated: None,
                });
            }
            Err(err) if err.is_expired_quiz() => err,
            Err(err) => return Err(err),
        };

        info!(quiz_id = %submission.quiz_id, "quiz id expired, regenerating");
        let mut fresh = match self.backend.generate_quiz(regenerate).await {
            Ok(fresh) => fresh,
            Err(err) => {
                warn!(error = %err, "quiz regeneration failed");
                return Err(expired);
            }
        };
        if fresh.is_empty() {
            fresh.questions.clone_from(&shown.questions);
        }
        self.remember(&regenerate.video, &fresh).await;

        let retry = QuizSubmission {
            quiz_id: fresh.quiz_id.clone(),
            video_no: None,
            total_videos: None,
            ..submission
        };
        let grade = self.backend.submit_quiz(&retry).await?;
        Ok(SubmitOutcome {
            grade,
            regenerated: Some(fresh),
        })
    }

    async fn remember(&self, video: &VideoRef, quiz: &QuizContent) {
        if let Err(err) = self.lessons.put_quiz(video, quiz).await {
            warn!(video = %video.as_str(), error = %err, "quiz cache write failed");
        }
    }
}
