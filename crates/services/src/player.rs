use std::sync::Arc;

use serde_json::Value;
use storage::{CacheKey, Storage};
use tracing::{debug, info, warn};
use zenith_core::gating::{Denial, Gate, LessonCursor, LessonToken, Notice};
use zenith_core::model::{
    CourseState, GlobalId, LearnerProfile, Lesson, LessonKey, QuizContent, QuizGrade, Roadmap,
    VideoRef,
};
use zenith_core::progress::ProgressError;
use zenith_core::quiz::{
    PASS_PERCENT_LABEL, QuizError, QuizPhase, QuizSession, StartCheck, Verdict,
};
use zenith_core::time::Cooldown;
use zenith_core::{Clock, GlobalIndex, ProgressSnapshot, ProgressState};

use crate::backend::{CourseBackend, QuizRequest, QuizSubmission, TranscriptReply};
use crate::config::EngineConfig;
use crate::content::{
    ContentService, LessonContext, TRANSCRIPT_PROCESSING, TRANSCRIPT_UNAVAILABLE, Tagged,
};
use crate::error::{BackendError, PlayerError};
use crate::persistence::{Hydration, ProgressMirror, SaveReason};
use crate::quiz_flow::QuizFlow;

/// Collaborators of a [`CoursePlayer`].
#[derive(Clone)]
pub struct PlayerDeps {
    pub backend: Arc<dyn CourseBackend>,
    pub storage: Storage,
    /// Signed-in user; `None` keeps progress under the shared guest slot.
    pub user_id: Option<String>,
    pub config: EngineConfig,
    pub clock: Clock,
}

/// Study material loaded for the open lesson. Cleared on navigation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LessonView {
    pub transcript: Option<String>,
    /// Why no transcript is shown yet.
    pub transcript_status: Option<String>,
    pub summary: Option<String>,
    pub mindmap: Option<Value>,
}

/// One row of the course outline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LessonStatus {
    pub id: GlobalId,
    pub key: LessonKey,
    pub topic: String,
    pub unlocked: bool,
    pub passed: bool,
    pub submitted: bool,
    pub current: bool,
}

/// What happened to a submitted attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitReport {
    pub verdict: Verdict,
    pub grade: QuizGrade,
    /// Pass mark shown next to the score.
    pub required: u32,
    /// Lesson opened up by this pass, if any.
    pub unlocked: Option<GlobalId>,
    pub message: String,
}

/// Drives one learner through one course: lesson selection under the
/// unlock rule, the quiz lifecycle, progress persistence, and per-lesson
/// study material.
///
/// Single owner; every mutation goes through `&mut self`.
pub struct CoursePlayer {
    course_title: String,
    plan: Value,
    profile: LearnerProfile,
    roadmap: Arc<Roadmap>,
    index: GlobalIndex,
    progress: ProgressState,
    cursor: LessonCursor,
    quiz: QuizSession,
    cooldown: Cooldown,
    notice: Option<Notice>,
    view: LessonView,
    hydration: Option<Hydration>,
    clock: Clock,
    config: EngineConfig,
    backend: Arc<dyn CourseBackend>,
    mirror: ProgressMirror,
    quizzes: QuizFlow,
    content: ContentService,
}

impl CoursePlayer {
    /// Load the saved course from the backend and start playing it.
    ///
    /// # Errors
    ///
    /// `PlayerError::CourseNotFound` when the backend has no such course,
    /// or the backend error.
    pub async fn open(deps: PlayerDeps, course_title: &str) -> Result<Self, PlayerError> {
        let course = deps
            .backend
            .load_course_state(course_title)
            .await?
            .ok_or_else(|| PlayerError::CourseNotFound(course_title.to_owned()))?;
        Ok(Self::start(deps, course_title, course).await)
    }

    /// Start playing a course whose roadmap is already at hand.
    ///
    /// Progress is restored from the local cache first, then replaced by
    /// the remote snapshot when one exists.
    pub async fn start(deps: PlayerDeps, course_title: &str, course: CourseState) -> Self {
        let key = CacheKey::new(deps.user_id.as_deref(), course_title);
        let course_title = key.course_title().to_owned();
        let mirror = ProgressMirror::new(
            key,
            Arc::clone(&deps.storage.progress),
            Arc::clone(&deps.backend),
            deps.config.save_debounce,
        );
        let roadmap = Arc::new(course.roadmap);
        let index = GlobalIndex::build(&roadmap);
        let cursor = LessonCursor::default();

        let mut player = Self {
            quizzes: QuizFlow::new(Arc::clone(&deps.backend), Arc::clone(&deps.storage.lessons)),
            content: ContentService::new(Arc::clone(&deps.backend), deps.storage.lessons),
            backend: deps.backend,
            course_title,
            plan: course.plan,
            profile: course.profile,
            roadmap,
            index,
            progress: ProgressState::new(),
            quiz: QuizSession::new(cursor.key()),
            cursor,
            cooldown: Cooldown::default(),
            notice: None,
            view: LessonView::default(),
            hydration: None,
            clock: deps.clock,
            config: deps.config,
            mirror,
        };
        if let Some(first) = player.index.key_of(GlobalId::FIRST) {
            player.enter_lesson(first);
        }
        player.hydrate().await;
        player
    }

    //
    // ─── ROADMAP ───────────────────────────────────────────────────────────────
    //

    /// Install a new roadmap. The global index is rebuilt only when the
    /// roadmap actually changed; progress is re-validated against it.
    pub async fn replace_roadmap(&mut self, roadmap: Arc<Roadmap>) {
        if Arc::ptr_eq(&self.roadmap, &roadmap) {
            return;
        }
        let snapshot = self.progress.to_snapshot(&self.index);
        self.index = GlobalIndex::build(&roadmap);
        self.roadmap = roadmap;
        self.progress = ProgressState::from_snapshot(&snapshot, &self.index);

        if self.index.global_id(self.cursor.key()).is_none() {
            let resume = self.progress.compute_resume_id(&self.index);
            if let Some(key) = self.index.key_of(resume) {
                self.enter_lesson(key);
            }
        }
        if !self.mirror.is_hydrated() {
            self.hydrate().await;
        }
    }

    async fn hydrate(&mut self) {
        if let Some(local) = self.mirror.load_local().await {
            self.install(&local);
        }
        if self.index.is_empty() {
            return;
        }
        let hydration = self.mirror.load_remote().await;
        if let Hydration::Remote(snapshot) = &hydration {
            self.install(snapshot);
        }
        info!(course = %self.course_title, ?hydration, "progress hydrated");
        self.hydration = Some(hydration);
    }

    /// Adopt `snapshot` and jump to its resume lesson.
    fn install(&mut self, snapshot: &ProgressSnapshot) {
        self.progress = ProgressState::from_snapshot(snapshot, &self.index);
        let resume = self.progress.compute_resume_id(&self.index);
        let key = self
            .index
            .key_of(resume)
            .or_else(|| self.index.key_of(GlobalId::FIRST));
        if let Some(key) = key {
            self.enter_lesson(key);
        }
    }

    //
    // ─── NAVIGATION ────────────────────────────────────────────────────────────
    //

    /// Open the lesson at `key` if it is unlocked. Reopening the current
    /// lesson also starts it over with a cleared view and quiz.
    ///
    /// # Errors
    ///
    /// The `Denial` is also posted as the current notice.
    pub async fn select(&mut self, key: LessonKey) -> Result<GlobalId, Denial> {
        let id = match Gate::new(&self.index, &self.progress).check_select(key) {
            Ok(id) => id,
            Err(denial) => return Err(self.deny(denial)),
        };
        let moved = key != self.cursor.key();
        self.enter_lesson(key);
        if moved {
            self.save(SaveReason::Debounced).await;
        }
        Ok(id)
    }

    /// # Errors
    ///
    /// `Denial::NextLocked` until the current quiz is passed,
    /// `Denial::EndOfCourse` on the last lesson.
    pub async fn next(&mut self) -> Result<GlobalId, Denial> {
        let current = self.current_id();
        let key = match Gate::new(&self.index, &self.progress).next_from(current) {
            Ok(key) => key,
            Err(denial) => return Err(self.deny(denial)),
        };
        self.select(key).await
    }

    /// Earlier lessons are always reachable.
    ///
    /// # Errors
    ///
    /// `Denial::StartOfCourse` on the first lesson.
    pub async fn previous(&mut self) -> Result<GlobalId, Denial> {
        let current = self.current_id();
        let key = match Gate::new(&self.index, &self.progress).previous_from(current) {
            Ok(key) => key,
            Err(denial) => return Err(self.deny(denial)),
        };
        self.enter_lesson(key);
        self.save(SaveReason::Debounced).await;
        Ok(self.current_id())
    }

    fn deny(&mut self, denial: Denial) -> Denial {
        debug!(%denial, "navigation refused");
        self.post_notice(denial.to_string());
        denial
    }

    fn post_notice(&mut self, text: String) {
        self.notice = Some(Notice::new(text, self.clock.now()));
    }

    /// Move the cursor and drop everything tied to the previous lesson.
    fn enter_lesson(&mut self, key: LessonKey) {
        self.cursor.move_to(key);
        self.quiz = QuizSession::new(key);
        self.view = LessonView::default();
    }

    //
    // ─── QUIZ ──────────────────────────────────────────────────────────────────
    //

    /// Show the cached quiz for this lesson right away and hand back the
    /// generation request that revalidates it.
    ///
    /// The returned request is tagged with the lesson; run it through
    /// [`QuizFlow::refresh`] and pass the reply to [`Self::apply_quiz`].
    ///
    /// # Errors
    ///
    /// `QuizBlocked` reasons from the start guard, also posted as the
    /// current notice.
    pub async fn start_quiz(&mut self) -> Result<Tagged<QuizRequest>, PlayerError> {
        let key = self.cursor.key();
        let now = self.clock.now();
        let video = self.current_video();
        let check = StartCheck {
            has_course: !self.index.is_empty(),
            has_video: video.as_url().is_some(),
            unlocked: self.progress.is_unlocked(&self.index, key),
            passed: self.progress.is_passed(key),
            cooldown_left: self.cooldown.remaining(now),
        };
        if let Err(blocked) = check.verify() {
            debug!(%blocked, "quiz start refused");
            self.post_notice(blocked.to_string());
            return Err(blocked.into());
        }

        if let Some(cached) = self.quizzes.cached(&video).await {
            self.quiz.load(cached);
            self.progress.clear_submission(key);
        }
        self.cooldown.start(now, self.config.quiz_cooldown);
        self.quiz.begin_loading();

        let request = self.quiz_request().await;
        Ok(Tagged::new(self.cursor.token(), request))
    }

    /// Swap in a freshly generated quiz. Returns `false` when the reply is
    /// for a lesson the learner left, when the shown quiz was already
    /// submitted, or when generation failed but a cached quiz stays shown.
    ///
    /// # Errors
    ///
    /// The generation error when there is nothing to show instead.
    pub async fn apply_quiz(
        &mut self,
        reply: Tagged<Result<QuizContent, BackendError>>,
    ) -> Result<bool, PlayerError> {
        if !self.is_current(reply.token()) {
            return Ok(false);
        }
        match reply.into_inner() {
            Ok(_) if matches!(self.quiz.phase(), QuizPhase::Submitted(_)) => {
                debug!("fresh quiz kept for the next attempt");
                Ok(false)
            }
            Ok(quiz) => {
                self.quiz.load(quiz);
                self.progress.clear_submission(self.cursor.key());
                self.save(SaveReason::Debounced).await;
                Ok(true)
            }
            Err(err) => {
                self.quiz.abort_loading();
                if self.quiz.content().is_some() {
                    warn!(error = %err, "quiz refresh failed, keeping cached quiz");
                    Ok(false)
                } else {
                    Err(err.into())
                }
            }
        }
    }

    /// Start the quiz and wait for the fresh generation.
    ///
    /// # Errors
    ///
    /// As [`Self::start_quiz`] and [`Self::apply_quiz`].
    pub async fn load_quiz(&mut self) -> Result<(), PlayerError> {
        let request = self.start_quiz().await?;
        let reply = self.quizzes.refresh(request).await;
        self.apply_quiz(reply).await.map(drop)
    }

    /// # Errors
    ///
    /// `QuizError::NotReady` or `QuizError::QuestionOutOfRange`.
    pub fn answer(&mut self, question: usize, option: impl Into<String>) -> Result<(), QuizError> {
        self.quiz.select_answer(question, option)
    }

    /// Grade the attempt and record the outcome.
    ///
    /// A pass unlocks the next lesson. Either way progress is written
    /// through to both stores before returning.
    ///
    /// # Errors
    ///
    /// `QuizError::Unanswered` for blank answers, `QuizError::NotReady`
    /// without a loaded quiz, or the backend error. Progress is untouched
    /// on error.
    pub async fn submit_quiz(&mut self) -> Result<SubmitReport, PlayerError> {
        let answers = self.quiz.answers_for_submit()?;
        let shown = self.quiz.content().cloned().ok_or(QuizError::NotReady)?;
        let key = self.cursor.key();
        let id = self
            .index
            .global_id(key)
            .ok_or(ProgressError::UnknownLesson(key))?;

        let submission = QuizSubmission {
            course_title: self.course_title.clone(),
            quiz_id: shown.quiz_id.clone(),
            answers,
            video_no: Some(id.value()),
            total_videos: Some(self.index.total()),
        };
        let request = self.quiz_request().await;
        let outcome = self.quizzes.submit(submission, &request, &shown).await?;
        if let Some(fresh) = outcome.regenerated {
            self.quiz.replace_quiz_id(fresh.quiz_id);
        }

        let grade = outcome.grade;
        let verdict = self.quiz.record_grade(grade.clone());
        let (unlocked, message) = match verdict {
            Verdict::Passed => {
                let pass = self.progress.apply_pass(&self.index, key)?;
                let message = match pass.unlocked {
                    Some(next) => {
                        format!("✅ Passed! Video ID {id} completed. Unlocked Video ID {next}.")
                    }
                    None => format!("✅ Passed! Video ID {id} completed. Course complete."),
                };
                (pass.unlocked, message)
            }
            Verdict::Failed => {
                self.progress.apply_fail(&self.index, key)?;
                let message = format!(
                    "❌ Not passed (need ≥{PASS_PERCENT_LABEL}). You can reattempt until you pass."
                );
                (None, message)
            }
        };
        info!(lesson = %id, score = grade.score, ?verdict, "quiz graded");
        self.post_notice(message.clone());
        self.save(SaveReason::Immediate).await;

        if verdict == Verdict::Passed {
            if let Err(err) = self
                .backend
                .mark_completed(&self.course_title, &request.video)
                .await
            {
                warn!(error = %err, "completion upsert failed");
            }
        }

        Ok(SubmitReport {
            verdict,
            required: self.quiz.required_mark(),
            grade,
            unlocked,
            message,
        })
    }

    /// Retake a failed quiz with the same questions.
    ///
    /// # Errors
    ///
    /// `QuizError::NotFailed` unless the last attempt failed.
    pub async fn reattempt(&mut self) -> Result<(), PlayerError> {
        self.quiz.reattempt()?;
        self.progress.clear_submission(self.cursor.key());
        self.save(SaveReason::Debounced).await;
        Ok(())
    }

    async fn quiz_request(&self) -> QuizRequest {
        let video = self.current_video();
        let transcript = match &self.view.transcript {
            Some(text) => text.clone(),
            None => self
                .content
                .cached_transcript(&video)
                .await
                .unwrap_or_default(),
        };
        QuizRequest {
            course_title: self.course_title.clone(),
            video,
            transcript,
        }
    }

    //
    // ─── STUDY MATERIAL ────────────────────────────────────────────────────────
    //

    /// Snapshot of the open lesson for a content request.
    #[must_use]
    pub fn lesson_context(&self) -> LessonContext {
        let topic = self
            .current_lesson()
            .map(|lesson| lesson.topic.clone())
            .unwrap_or_default();
        LessonContext {
            token: self.cursor.token(),
            course_title: self.course_title.clone(),
            video: self.current_video(),
            topic,
            summary_type: self.profile.summary_type().to_owned(),
        }
    }

    #[must_use]
    pub fn content(&self) -> &ContentService {
        &self.content
    }

    #[must_use]
    pub fn quizzes(&self) -> &QuizFlow {
        &self.quizzes
    }

    /// Apply a transcript reply. Returns `false` for a reply addressed to a
    /// lesson the learner has since left.
    pub fn apply_transcript(&mut self, reply: Tagged<TranscriptReply>) -> bool {
        if !self.is_current(reply.token()) {
            return false;
        }
        match reply.into_inner() {
            TranscriptReply::Ready(text) => {
                self.view.transcript = Some(text);
                self.view.transcript_status = None;
            }
            TranscriptReply::Processing => {
                self.view.transcript_status = Some(TRANSCRIPT_PROCESSING.to_owned());
            }
            TranscriptReply::Unavailable => {
                self.view.transcript_status = Some(TRANSCRIPT_UNAVAILABLE.to_owned());
            }
        }
        true
    }

    pub fn apply_summary(&mut self, reply: Tagged<String>) -> bool {
        if !self.is_current(reply.token()) {
            return false;
        }
        self.view.summary = Some(reply.into_inner());
        true
    }

    pub fn apply_mindmap(&mut self, reply: Tagged<Value>) -> bool {
        if !self.is_current(reply.token()) {
            return false;
        }
        self.view.mindmap = Some(reply.into_inner());
        true
    }

    fn is_current(&self, token: LessonToken) -> bool {
        let current = self.cursor.is_current(token);
        if !current {
            debug!("stale lesson content dropped");
        }
        current
    }

    /// # Errors
    ///
    /// `PlayerError::NoVideo` or the backend error, which is also kept as
    /// the transcript status.
    pub async fn load_transcript(&mut self) -> Result<TranscriptReply, PlayerError> {
        let lesson = self.lesson_context();
        match self.content.transcript(&lesson).await {
            Ok(reply) => {
                let value = reply.value().clone();
                self.apply_transcript(reply);
                Ok(value)
            }
            Err(err) => {
                self.view.transcript_status = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// # Errors
    ///
    /// `PlayerError::TranscriptMissing` before a transcript is loaded,
    /// `PlayerError::NoVideo`, or the backend error.
    pub async fn summarize(&mut self) -> Result<String, PlayerError> {
        let lesson = self.lesson_context();
        let transcript = self.view.transcript.clone().unwrap_or_default();
        let reply = self.content.summary(&lesson, &transcript).await?;
        let summary = reply.value().clone();
        self.apply_summary(reply);
        Ok(summary)
    }

    /// Mindmap of the open lesson, reused until `force` asks for a new one.
    ///
    /// # Errors
    ///
    /// `PlayerError::NoVideo` or the backend error.
    pub async fn mindmap(&mut self, force: bool) -> Result<Value, PlayerError> {
        if !force {
            if let Some(tree) = &self.view.mindmap {
                return Ok(tree.clone());
            }
        }
        if self.view.transcript.is_none() {
            if let Err(err) = self.load_transcript().await {
                debug!(error = %err, "mindmap continues without transcript");
            }
        }
        let lesson = self.lesson_context();
        let transcript = self.view.transcript.clone().unwrap_or_default();
        let reply = self.content.mindmap(&lesson, &transcript, force).await?;
        let tree = reply.value().clone();
        self.apply_mindmap(reply);
        Ok(tree)
    }

    //
    // ─── LIFECYCLE ─────────────────────────────────────────────────────────────
    //

    /// Send any pending debounced save before letting go of the player.
    pub async fn close(mut self) {
        self.mirror.flush().await;
    }

    async fn save(&mut self, reason: SaveReason) {
        let snapshot = self.progress.to_snapshot(&self.index);
        self.mirror.save(snapshot, reason).await;
    }

    //
    // ─── ACCESSORS ─────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn course_title(&self) -> &str {
        &self.course_title
    }

    /// Free-form plan text saved with the course.
    #[must_use]
    pub fn plan(&self) -> &Value {
        &self.plan
    }

    #[must_use]
    pub fn profile(&self) -> &LearnerProfile {
        &self.profile
    }

    #[must_use]
    pub fn roadmap(&self) -> &Arc<Roadmap> {
        &self.roadmap
    }

    #[must_use]
    pub fn index(&self) -> &GlobalIndex {
        &self.index
    }

    #[must_use]
    pub fn progress(&self) -> &ProgressState {
        &self.progress
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.progress.to_snapshot(&self.index)
    }

    #[must_use]
    pub fn current_key(&self) -> LessonKey {
        self.cursor.key()
    }

    #[must_use]
    pub fn current_id(&self) -> GlobalId {
        self.cursor.global_id(&self.index)
    }

    #[must_use]
    pub fn current_lesson(&self) -> Option<&Lesson> {
        self.roadmap.lesson(self.cursor.key())
    }

    #[must_use]
    pub fn current_video(&self) -> VideoRef {
        self.current_lesson()
            .map_or(VideoRef::Missing, |lesson| lesson.video.clone())
    }

    #[must_use]
    pub fn has_next(&self) -> bool {
        Gate::new(&self.index, &self.progress).has_next(self.current_id())
    }

    #[must_use]
    pub fn quiz(&self) -> &QuizSession {
        &self.quiz
    }

    #[must_use]
    pub fn view(&self) -> &LessonView {
        &self.view
    }

    /// Outcome of the remote progress fetch, `None` before it ran.
    #[must_use]
    pub fn hydration(&self) -> Option<&Hydration> {
        self.hydration.as_ref()
    }

    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.mirror.is_hydrated()
    }

    /// The transient notice, while it has not expired.
    #[must_use]
    pub fn notice(&self) -> Option<&str> {
        let now = self.clock.now();
        self.notice
            .as_ref()
            .filter(|notice| notice.is_active(now))
            .map(Notice::text)
    }

    pub fn clock_mut(&mut self) -> &mut Clock {
        &mut self.clock
    }

    /// Course outline with unlock and quiz state per lesson.
    #[must_use]
    pub fn lessons(&self) -> Vec<LessonStatus> {
        let current = self.cursor.key();
        self.index
            .iter()
            .map(|(id, key)| LessonStatus {
                id,
                key,
                topic: self
                    .roadmap
                    .lesson(key)
                    .map(|lesson| lesson.topic.clone())
                    .unwrap_or_default(),
                unlocked: self.progress.is_unlocked(&self.index, key),
                passed: self.progress.is_passed(key),
                submitted: self.progress.is_submitted(key),
                current: key == current,
            })
            .collect()
    }
}
