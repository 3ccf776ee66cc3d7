use std::collections::BTreeMap;

use chrono::Duration;
use thiserror::Error;

use crate::model::{LessonKey, QuizContent, QuizGrade, QuizId};

/// Share of correct answers needed to pass when the backend does not say.
pub const PASS_PERCENT: f64 = 0.4;
pub const PASS_PERCENT_LABEL: &str = "40%";

/// Minimum gap between two quiz generation requests.
pub const QUIZ_COOLDOWN_SECS: i64 = 15;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

/// Local quiz validation failures. None of these reach the backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("Quiz not ready yet")]
    NotReady,

    #[error("question {index} does not exist")]
    QuestionOutOfRange { index: usize },

    #[error("Please answer all questions before submitting.")]
    Unanswered { missing: Vec<usize> },

    #[error("only a failed attempt can be retaken")]
    NotFailed,
}

/// Why the quiz cannot be started right now. `Display` is user-facing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizBlocked {
    #[error("Loading course content…")]
    NoCourse,

    #[error("No video available")]
    NoVideo,

    #[error("Locked. Complete previous quiz to unlock.")]
    Locked,

    #[error("Quiz already passed for this video.")]
    AlreadyPassed,

    #[error("Please wait {secs}s before trying again.")]
    CoolingDown { secs: i64 },
}

/// Inputs of the start guard, gathered by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartCheck {
    pub has_course: bool,
    pub has_video: bool,
    pub unlocked: bool,
    pub passed: bool,
    pub cooldown_left: Option<Duration>,
}

impl StartCheck {
    /// # Errors
    ///
    /// Returns the first failing condition, in the order the UI reports them.
    pub fn verify(self) -> Result<(), QuizBlocked> {
        if !self.has_course {
            return Err(QuizBlocked::NoCourse);
        }
        if !self.unlocked {
            return Err(QuizBlocked::Locked);
        }
        if self.passed {
            return Err(QuizBlocked::AlreadyPassed);
        }
        if let Some(left) = self.cooldown_left {
            // round up so "0s" is never shown while still blocked
            let secs = (left.num_milliseconds() + 999) / 1000;
            return Err(QuizBlocked::CoolingDown { secs });
        }
        if !self.has_video {
            return Err(QuizBlocked::NoVideo);
        }
        Ok(())
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Passed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizPhase {
    NotStarted,
    Loading,
    Ready,
    Submitted(Verdict),
}

/// Ephemeral quiz attempt for the current lesson.
///
/// Dropped when the learner navigates to another lesson.
#[derive(Debug, Clone, PartialEq)]
pub struct QuizSession {
    lesson: LessonKey,
    phase: QuizPhase,
    content: Option<QuizContent>,
    answers: BTreeMap<usize, String>,
    grade: Option<QuizGrade>,
}

impl QuizSession {
    #[must_use]
    pub fn new(lesson: LessonKey) -> Self {
        Self {
            lesson,
            phase: QuizPhase::NotStarted,
            content: None,
            answers: BTreeMap::new(),
            grade: None,
        }
    }

    // Accessors
    #[must_use]
    pub fn lesson(&self) -> LessonKey {
        self.lesson
    }

    #[must_use]
    pub fn phase(&self) -> QuizPhase {
        self.phase
    }

    #[must_use]
    pub fn content(&self) -> Option<&QuizContent> {
        self.content.as_ref()
    }

    #[must_use]
    pub fn quiz_id(&self) -> Option<&QuizId> {
        self.content.as_ref().map(|c| &c.quiz_id)
    }

    #[must_use]
    pub fn grade(&self) -> Option<&QuizGrade> {
        self.grade.as_ref()
    }

    #[must_use]
    pub fn answer(&self, index: usize) -> Option<&str> {
        self.answers.get(&index).map(String::as_str)
    }

    /// Marks generation as in flight. Content already shown stays visible.
    pub fn begin_loading(&mut self) {
        if self.content.is_none() {
            self.phase = QuizPhase::Loading;
        }
    }

    /// Shows `content` and starts a fresh attempt.
    pub fn load(&mut self, content: QuizContent) {
        self.content = Some(content);
        self.answers.clear();
        self.grade = None;
        self.phase = QuizPhase::Ready;
    }

    /// Swap in a regenerated quiz id, keeping questions and answers.
    pub fn replace_quiz_id(&mut self, quiz_id: QuizId) {
        if let Some(content) = self.content.as_mut() {
            content.quiz_id = quiz_id;
        }
    }

    /// Generation failed; fall back to `NotStarted` unless content is shown.
    pub fn abort_loading(&mut self) {
        if self.phase == QuizPhase::Loading {
            self.phase = QuizPhase::NotStarted;
        }
    }

    /// # Errors
    ///
    /// `QuizError::NotReady` outside the `Ready` phase,
    /// `QuizError::QuestionOutOfRange` for an unknown question.
    pub fn select_answer(&mut self, index: usize, option: impl Into<String>) -> Result<(), QuizError> {
        if self.phase != QuizPhase::Ready {
            return Err(QuizError::NotReady);
        }
        let count = self.content.as_ref().map_or(0, |c| c.questions.len());
        if index >= count {
            return Err(QuizError::QuestionOutOfRange { index });
        }
        self.answers.insert(index, option.into());
        Ok(())
    }

    /// Answers in question order, ready for submission.
    ///
    /// # Errors
    ///
    /// `QuizError::NotReady` without loaded content, `QuizError::Unanswered`
    /// listing every blank question.
    pub fn answers_for_submit(&self) -> Result<Vec<String>, QuizError> {
        let content = self.content.as_ref().ok_or(QuizError::NotReady)?;
        if self.phase != QuizPhase::Ready {
            return Err(QuizError::NotReady);
        }
        let answers: Vec<String> = (0..content.questions.len())
            .map(|i| self.answers.get(&i).cloned().unwrap_or_default())
            .collect();
        let missing: Vec<usize> = answers
            .iter()
            .enumerate()
            .filter(|(_, a)| a.trim().is_empty())
            .map(|(i, _)| i)
            .collect();
        if !missing.is_empty() {
            return Err(QuizError::Unanswered { missing });
        }
        Ok(answers)
    }

    pub fn record_grade(&mut self, grade: QuizGrade) -> Verdict {
        let verdict = if grade.passed {
            Verdict::Passed
        } else {
            Verdict::Failed
        };
        self.grade = Some(grade);
        self.phase = QuizPhase::Submitted(verdict);
        verdict
    }

    /// Clear answers and score to retake the same quiz.
    ///
    /// # Errors
    ///
    /// `QuizError::NotFailed` unless the last attempt failed.
    pub fn reattempt(&mut self) -> Result<(), QuizError> {
        if self.phase != QuizPhase::Submitted(Verdict::Failed) {
            return Err(QuizError::NotFailed);
        }
        self.answers.clear();
        self.grade = None;
        self.phase = QuizPhase::Ready;
        Ok(())
    }

    /// Pass mark to display: the backend's value, else 40% of the questions.
    #[must_use]
    pub fn required_mark(&self) -> u32 {
        if let Some(required) = self.grade.as_ref().and_then(|g| g.required) {
            return required;
        }
        let questions = self.content.as_ref().map_or(0, |c| c.questions.len());
        required_for(questions)
    }
}

/// Local pass mark for a quiz with `questions` questions (10 assumed when empty).
#[must_use]
pub fn required_for(questions: usize) -> u32 {
    let questions = if questions == 0 { 10 } else { questions };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let mark = (questions as f64 * PASS_PERCENT).ceil() as u32;
    mark.max(1)
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuizQuestion;

    fn content(n: usize) -> QuizContent {
        QuizContent {
            quiz_id: QuizId::new("q-1"),
            questions: (0..n)
                .map(|i| QuizQuestion {
                    question: format!("Q{i}"),
                    options: vec!["a".into(), "b".into()],
                })
                .collect(),
        }
    }

    fn grade(passed: bool) -> QuizGrade {
        QuizGrade {
            score: if passed { 3 } else { 0 },
            attempts_left: Some(2),
            passed,
            required: Some(2),
        }
    }

    #[test]
    fn lifecycle_pass() {
        let mut session = QuizSession::new(LessonKey::new(0, 0));
        assert_eq!(session.phase(), QuizPhase::NotStarted);
        session.begin_loading();
        assert_eq!(session.phase(), QuizPhase::Loading);
        session.load(content(2));
        session.select_answer(0, "a").unwrap();
        session.select_answer(1, "b").unwrap();
        assert_eq!(session.answers_for_submit().unwrap(), vec!["a", "b"]);
        assert_eq!(session.record_grade(grade(true)), Verdict::Passed);
        assert_eq!(session.phase(), QuizPhase::Submitted(Verdict::Passed));
        assert_eq!(session.reattempt(), Err(QuizError::NotFailed));
    }

    #[test]
    fn blank_answers_are_rejected() {
        let mut session = QuizSession::new(LessonKey::new(0, 0));
        session.load(content(3));
        session.select_answer(1, "  ").unwrap();
        assert_eq!(
            session.answers_for_submit(),
            Err(QuizError::Unanswered { missing: vec![0, 1, 2] })
        );
    }

    #[test]
    fn answers_require_loaded_quiz() {
        let mut session = QuizSession::new(LessonKey::new(0, 0));
        assert_eq!(session.select_answer(0, "a"), Err(QuizError::NotReady));
        assert_eq!(session.answers_for_submit(), Err(QuizError::NotReady));
        session.load(content(1));
        assert_eq!(
            session.select_answer(5, "a"),
            Err(QuizError::QuestionOutOfRange { index: 5 })
        );
    }

    #[test]
    fn failed_attempt_can_be_retaken() {
        let mut session = QuizSession::new(LessonKey::new(0, 0));
        session.load(content(1));
        session.select_answer(0, "a").unwrap();
        assert_eq!(session.record_grade(grade(false)), Verdict::Failed);

        session.reattempt().unwrap();
        assert_eq!(session.phase(), QuizPhase::Ready);
        assert_eq!(session.answer(0), None);
        assert_eq!(session.quiz_id(), Some(&QuizId::new("q-1")));
    }

    #[test]
    fn loading_keeps_cached_content_visible() {
        let mut session = QuizSession::new(LessonKey::new(0, 0));
        session.load(content(1));
        session.begin_loading();
        assert_eq!(session.phase(), QuizPhase::Ready);
        session.abort_loading();
        assert_eq!(session.phase(), QuizPhase::Ready);
    }

    #[test]
    fn required_mark_falls_back_to_percentage() {
        assert_eq!(required_for(10), 4);
        assert_eq!(required_for(3), 2);
        assert_eq!(required_for(1), 1);
        assert_eq!(required_for(0), 4);

        let mut session = QuizSession::new(LessonKey::new(0, 0));
        session.load(content(5));
        assert_eq!(session.required_mark(), 2);
        session.select_answer(0, "a").unwrap();
        session.record_grade(QuizGrade {
            required: Some(3),
            ..grade(false)
        });
        assert_eq!(session.required_mark(), 3);
    }

    #[test]
    fn start_check_reports_first_blocker() {
        let open = StartCheck {
            has_course: true,
            has_video: true,
            unlocked: true,
            passed: false,
            cooldown_left: None,
        };
        assert_eq!(open.verify(), Ok(()));
        assert_eq!(
            StartCheck { unlocked: false, ..open }.verify(),
            Err(QuizBlocked::Locked)
        );
        assert_eq!(
            StartCheck { passed: true, ..open }.verify(),
            Err(QuizBlocked::AlreadyPassed)
        );
        let waiting = StartCheck {
            cooldown_left: Some(Duration::milliseconds(4_200)),
            ..open
        };
        assert_eq!(waiting.verify(), Err(QuizBlocked::CoolingDown { secs: 5 }));
        assert_eq!(
            waiting.verify().unwrap_err().to_string(),
            "Please wait 5s before trying again."
        );
        assert_eq!(
            StartCheck { has_video: false, ..open }.verify(),
            Err(QuizBlocked::NoVideo)
        );
    }
}
