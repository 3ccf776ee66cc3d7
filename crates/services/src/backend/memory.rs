use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use zenith_core::model::{CourseState, QuizContent, QuizGrade, QuizId, QuizQuestion, VideoRef};
use zenith_core::progress::ProgressSnapshot;
use zenith_core::quiz::required_for;

use super::{
    CourseBackend, MindmapRequest, QuizRequest, QuizSubmission, SummaryRequest, TranscriptReply,
};
use crate::error::BackendError;
use crate::identity::{IdentityProvider, StaticIdentity, require_token};

/// A call observed by [`InMemoryBackend`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    LoadCourseState(String),
    LoadProgress(String),
    SaveProgress(ProgressSnapshot),
    GenerateQuiz(VideoRef),
    SubmitQuiz(QuizId),
    FetchTranscript(VideoRef),
    Summarize { summary_type: String },
    GenerateMindmap { force: bool },
    MarkCompleted(VideoRef),
}

#[derive(Debug, Clone)]
struct BankedQuiz {
    questions: Vec<QuizQuestion>,
    answer_key: Vec<String>,
}

#[derive(Default)]
struct State {
    courses: HashMap<String, CourseState>,
    progress: HashMap<String, ProgressSnapshot>,
    bank: HashMap<String, BankedQuiz>,
    // quiz id -> video url
    live_quizzes: HashMap<String, String>,
    transcripts: HashMap<String, TranscriptReply>,
    issued: u64,
    offline: bool,
    generation_delay: Option<Duration>,
    calls: Vec<BackendCall>,
}

/// Process-local backend used by tests and offline demos.
///
/// Grades against an answer key registered per video with the same 40% pass
/// rule the real backend applies.
#[derive(Clone)]
pub struct InMemoryBackend {
    state: Arc<Mutex<State>>,
    identity: Arc<dyn IdentityProvider>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::with_identity(Arc::new(StaticIdentity::new("test-user", "test-token")))
    }

    #[must_use]
    pub fn with_identity(identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            identity,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, BackendError> {
        self.state
            .lock()
            .map_err(|err| BackendError::InvalidResponse(err.to_string()))
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        match self.state.lock() {
            Ok(mut guard) => f(&mut guard),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }

    pub fn insert_course(&self, title: &str, course: CourseState) {
        self.with_state(|s| s.courses.insert(title.to_owned(), course));
    }

    pub fn insert_progress(&self, title: &str, snapshot: ProgressSnapshot) {
        self.with_state(|s| s.progress.insert(title.to_owned(), snapshot));
    }

    #[must_use]
    pub fn progress(&self, title: &str) -> Option<ProgressSnapshot> {
        self.with_state(|s| s.progress.get(title).cloned())
    }

    /// Register the quiz generated for `video`; `answer_key[i]` is the
    /// correct option of question `i`.
    pub fn insert_quiz(&self, video: &str, questions: Vec<QuizQuestion>, answer_key: Vec<String>) {
        self.with_state(|s| {
            s.bank.insert(
                video.to_owned(),
                BankedQuiz {
                    questions,
                    answer_key,
                },
            )
        });
    }

    pub fn insert_transcript(&self, video: &str, reply: TranscriptReply) {
        self.with_state(|s| s.transcripts.insert(video.to_owned(), reply));
    }

    /// While offline every call fails as if all bases were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.with_state(|s| s.offline = offline);
    }

    /// Make every quiz generation take `delay`, like a slow model call.
    pub fn set_generation_delay(&self, delay: Duration) {
        self.with_state(|s| s.generation_delay = Some(delay));
    }

    /// Forget every issued quiz id, as a backend restart would.
    pub fn expire_quiz_ids(&self) {
        self.with_state(|s| s.live_quizzes.clear());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.with_state(|s| s.calls.clone())
    }

    pub fn clear_calls(&self) {
        self.with_state(|s| s.calls.clear());
    }

    #[must_use]
    pub fn saved_snapshots(&self) -> Vec<ProgressSnapshot> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                BackendCall::SaveProgress(snapshot) => Some(snapshot),
                _ => None,
            })
            .collect()
    }

    /// Authenticate, record the call, and fail when offline.
    async fn enter(&self, call: BackendCall) -> Result<MutexGuard<'_, State>, BackendError> {
        require_token(self.identity.as_ref()).await?;
        let mut state = self.lock()?;
        state.calls.push(call);
        if state.offline {
            return Err(BackendError::Unavailable {
                attempts: 1,
                last: "offline".into(),
            });
        }
        Ok(state)
    }
}

fn grade(banked: &BankedQuiz, answers: &[String]) -> QuizGrade {
    let score = banked
        .answer_key
        .iter()
        .zip(answers)
        .filter(|(expected, given)| expected.trim() == given.trim())
        .count();
    let required = required_for(banked.questions.len());
    let score = u32::try_from(score).unwrap_or(u32::MAX);
    QuizGrade {
        score,
        attempts_left: None,
        passed: score >= required,
        required: Some(required),
    }
}

#[async_trait]
impl CourseBackend for InMemoryBackend {
    async fn load_course_state(
        &self,
        course_title: &str,
    ) -> Result<Option<CourseState>, BackendError> {
        let state = self
            .enter(BackendCall::LoadCourseState(course_title.to_owned()))
            .await?;
        Ok(state.courses.get(course_title).cloned())
    }

    async fn load_progress(
        &self,
        course_title: &str,
    ) -> Result<Option<ProgressSnapshot>, BackendError> {
        let state = self
            .enter(BackendCall::LoadProgress(course_title.to_owned()))
            .await?;
        Ok(state.progress.get(course_title).cloned())
    }

    async fn save_progress(
        &self,
        course_title: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), BackendError> {
        let mut state = self
            .enter(BackendCall::SaveProgress(snapshot.clone()))
            .await?;
        state
            .progress
            .insert(course_title.to_owned(), snapshot.clone());
        Ok(())
    }

    async fn generate_quiz(&self, request: &QuizRequest) -> Result<QuizContent, BackendError> {
        if let Some(delay) = self.with_state(|s| s.generation_delay) {
            tokio::time::sleep(delay).await;
        }
        let mut state = self
            .enter(BackendCall::GenerateQuiz(request.video.clone()))
            .await?;
        let url = request.video.as_str().to_owned();
        let banked = state.bank.get(&url).cloned().ok_or(BackendError::Rejected {
            status: 400,
            message: "Failed to fetch quiz".into(),
        })?;
        state.issued += 1;
        let quiz_id = format!("quiz-{}", state.issued);
        state.live_quizzes.insert(quiz_id.clone(), url);
        Ok(QuizContent {
            quiz_id: QuizId::new(quiz_id),
            questions: banked.questions,
        })
    }

    async fn submit_quiz(&self, submission: &QuizSubmission) -> Result<QuizGrade, BackendError> {
        let state = self
            .enter(BackendCall::SubmitQuiz(submission.quiz_id.clone()))
            .await?;
        let banked = state
            .live_quizzes
            .get(submission.quiz_id.as_str())
            .and_then(|url| state.bank.get(url))
            .ok_or_else(BackendError::expired_quiz)?;
        Ok(grade(banked, &submission.answers))
    }

    async fn fetch_transcript(&self, video: &VideoRef) -> Result<TranscriptReply, BackendError> {
        let state = self
            .enter(BackendCall::FetchTranscript(video.clone()))
            .await?;
        Ok(state
            .transcripts
            .get(video.as_str())
            .cloned()
            .unwrap_or(TranscriptReply::Unavailable))
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<String, BackendError> {
        drop(
            self.enter(BackendCall::Summarize {
                summary_type: request.summary_type.clone(),
            })
            .await?,
        );
        let words = request.transcript.split_whitespace().count();
        Ok(format!("{} summary of {words} words", request.summary_type))
    }

    async fn generate_mindmap(&self, request: &MindmapRequest) -> Result<Value, BackendError> {
        drop(
            self.enter(BackendCall::GenerateMindmap {
                force: request.force,
            })
            .await?,
        );
        Ok(json!({ "name": request.title, "children": [] }))
    }

    async fn mark_completed(&self, _course_title: &str, video: &VideoRef) -> Result<(), BackendError> {
        drop(self.enter(BackendCall::MarkCompleted(video.clone())).await?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_question_quiz(backend: &InMemoryBackend) {
        let question = |q: &str| QuizQuestion {
            question: q.into(),
            options: vec!["a".into(), "b".into()],
        };
        backend.insert_quiz(
            "https://v/1",
            vec![question("one"), question("two")],
            vec!["a".into(), "b".into()],
        );
    }

    fn request() -> QuizRequest {
        QuizRequest {
            course_title: "Rust".into(),
            video: VideoRef::from_raw("https://v/1"),
            transcript: String::new(),
        }
    }

    #[tokio::test]
    async fn grades_against_answer_key() {
        let backend = InMemoryBackend::new();
        two_question_quiz(&backend);
        let quiz = backend.generate_quiz(&request()).await.unwrap();

        let submit = |answers: &[&str]| QuizSubmission {
            course_title: "Rust".into(),
            quiz_id: quiz.quiz_id.clone(),
            answers: answers.iter().map(|a| (*a).to_owned()).collect(),
            video_no: Some(1),
            total_videos: Some(1),
        };

        let fail = backend.submit_quiz(&submit(&["b", "a"])).await.unwrap();
        assert_eq!(fail.score, 0);
        assert!(!fail.passed);
        assert_eq!(fail.required, Some(1));

        let pass = backend.submit_quiz(&submit(&["a", "a"])).await.unwrap();
        assert_eq!(pass.score, 1);
        assert!(pass.passed);
    }

    #[tokio::test]
    async fn expired_ids_are_rejected() {
        let backend = InMemoryBackend::new();
        two_question_quiz(&backend);
        let quiz = backend.generate_quiz(&request()).await.unwrap();
        backend.expire_quiz_ids();

        let err = backend
            .submit_quiz(&QuizSubmission {
                course_title: "Rust".into(),
                quiz_id: quiz.quiz_id,
                answers: vec!["a".into(), "b".into()],
                video_no: None,
                total_videos: None,
            })
            .await
            .unwrap_err();
        assert!(err.is_expired_quiz());
    }

    #[tokio::test]
    async fn offline_calls_fail_but_are_recorded() {
        let backend = InMemoryBackend::new();
        backend.set_offline(true);

        let err = backend.load_progress("Rust").await.unwrap_err();
        assert!(matches!(err, BackendError::Unavailable { .. }));
        assert_eq!(backend.calls(), vec![BackendCall::LoadProgress("Rust".into())]);
    }

    #[tokio::test]
    async fn signed_out_calls_are_not_recorded() {
        let backend = InMemoryBackend::with_identity(Arc::new(StaticIdentity::signed_out()));
        let err = backend.load_progress("Rust").await.unwrap_err();
        assert!(matches!(err, BackendError::Unauthenticated));
        assert!(backend.calls().is_empty());
    }
}
