use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::index::GlobalIndex;
use crate::model::{GlobalId, LessonKey};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("lesson {0} is not part of the roadmap")]
    UnknownLesson(LessonKey),
}

//
// ─── SNAPSHOT ──────────────────────────────────────────────────────────────────
//

/// Serialized progress record, shared by the local cache and the remote store.
///
/// Maps are keyed by the `"week-lesson"` string form. Unknown or malformed
/// keys are tolerated on read and dropped when converted into [`ProgressState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    #[serde(default = "first_id")]
    pub current_global_id: u32,
    #[serde(default = "first_id")]
    pub highest_unlocked_id: u32,
    #[serde(default)]
    pub quiz_passed_map: BTreeMap<String, bool>,
    #[serde(default)]
    pub quiz_submitted_map: BTreeMap<String, bool>,
    #[serde(default)]
    pub quiz_completed_map: BTreeMap<String, bool>,
}

fn first_id() -> u32 {
    1
}

impl Default for ProgressSnapshot {
    fn default() -> Self {
        Self {
            current_global_id: 1,
            highest_unlocked_id: 1,
            quiz_passed_map: BTreeMap::new(),
            quiz_submitted_map: BTreeMap::new(),
            quiz_completed_map: BTreeMap::new(),
        }
    }
}

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

/// Result of grading a lesson's quiz as passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassOutcome {
    pub lesson: GlobalId,
    /// The id that became reachable, `None` when the last lesson was passed.
    pub unlocked: Option<GlobalId>,
}

/// Unlock and quiz bookkeeping for one user's course.
///
/// Unlocking is forward-only: no transition lowers `highest_unlocked`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    highest_unlocked: GlobalId,
    passed: BTreeMap<LessonKey, bool>,
    submitted: BTreeMap<LessonKey, bool>,
    completed: BTreeMap<LessonKey, bool>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressState {
    /// Fresh state: only the first lesson is unlocked.
    #[must_use]
    pub fn new() -> Self {
        Self {
            highest_unlocked: GlobalId::FIRST,
            passed: BTreeMap::new(),
            submitted: BTreeMap::new(),
            completed: BTreeMap::new(),
        }
    }

    /// Rebuild state from a persisted snapshot.
    ///
    /// `highest_unlocked` is clamped into `[1, max(total, 1)]`.
    #[must_use]
    pub fn from_snapshot(snapshot: &ProgressSnapshot, index: &GlobalIndex) -> Self {
        let ceiling = index.total().max(1);
        Self {
            highest_unlocked: GlobalId::new(snapshot.highest_unlocked_id.clamp(1, ceiling)),
            passed: typed_map(&snapshot.quiz_passed_map),
            submitted: typed_map(&snapshot.quiz_submitted_map),
            completed: typed_map(&snapshot.quiz_completed_map),
        }
    }

    /// Serializable form, with `current_global_id` set to the resume point.
    #[must_use]
    pub fn to_snapshot(&self, index: &GlobalIndex) -> ProgressSnapshot {
        ProgressSnapshot {
            current_global_id: self.compute_resume_id(index).value(),
            highest_unlocked_id: self.highest_unlocked.value(),
            quiz_passed_map: string_map(&self.passed),
            quiz_submitted_map: string_map(&self.submitted),
            quiz_completed_map: string_map(&self.completed),
        }
    }

    // Accessors
    #[must_use]
    pub fn highest_unlocked(&self) -> GlobalId {
        self.highest_unlocked
    }

    #[must_use]
    pub fn is_passed(&self, key: LessonKey) -> bool {
        self.passed.get(&key).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_submitted(&self, key: LessonKey) -> bool {
        self.submitted.get(&key).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_completed(&self, key: LessonKey) -> bool {
        self.completed.get(&key).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn passed_map(&self) -> &BTreeMap<LessonKey, bool> {
        &self.passed
    }

    /// True iff the lesson exists and its id is at or below the unlock frontier.
    #[must_use]
    pub fn is_unlocked(&self, index: &GlobalIndex, key: LessonKey) -> bool {
        index
            .global_id(key)
            .is_some_and(|id| id <= self.highest_unlocked)
    }

    #[must_use]
    pub fn compute_resume_id(&self, index: &GlobalIndex) -> GlobalId {
        compute_resume_id(index, &self.passed)
    }

    /// Record a passing grade and advance the unlock frontier past `key`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UnknownLesson` if `key` is not in the index.
    pub fn apply_pass(
        &mut self,
        index: &GlobalIndex,
        key: LessonKey,
    ) -> Result<PassOutcome, ProgressError> {
        let lesson = index
            .global_id(key)
            .ok_or(ProgressError::UnknownLesson(key))?;
        self.record_attempt(key, true);

        let next = lesson.next();
        let unlocked = if next.value() <= index.total() {
            self.highest_unlocked = self.highest_unlocked.max(next);
            Some(next)
        } else {
            None
        };
        Ok(PassOutcome { lesson, unlocked })
    }

    /// Record a failing grade. The unlock frontier is untouched.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::UnknownLesson` if `key` is not in the index.
    pub fn apply_fail(&mut self, index: &GlobalIndex, key: LessonKey) -> Result<(), ProgressError> {
        if index.global_id(key).is_none() {
            return Err(ProgressError::UnknownLesson(key));
        }
        self.record_attempt(key, false);
        Ok(())
    }

    /// Clear the submitted flag so a fresh attempt can be taken.
    pub fn clear_submission(&mut self, key: LessonKey) {
        self.submitted.insert(key, false);
    }

    fn record_attempt(&mut self, key: LessonKey, passed: bool) {
        self.submitted.insert(key, true);
        self.completed.insert(key, true);
        self.passed.insert(key, passed);
    }
}

/// First lesson whose quiz is not passed; `total` when every lesson is
/// passed, and 1 for an empty roadmap.
#[must_use]
pub fn compute_resume_id(index: &GlobalIndex, passed: &BTreeMap<LessonKey, bool>) -> GlobalId {
    index
        .iter()
        .find(|(_, key)| !passed.get(key).copied().unwrap_or(false))
        .map(|(id, _)| id)
        .or_else(|| index.last())
        .unwrap_or(GlobalId::FIRST)
}

fn typed_map(raw: &BTreeMap<String, bool>) -> BTreeMap<LessonKey, bool> {
    raw.iter()
        .filter_map(|(k, v)| k.parse::<LessonKey>().ok().map(|key| (key, *v)))
        .collect()
}

fn string_map(typed: &BTreeMap<LessonKey, bool>) -> BTreeMap<String, bool> {
    typed.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
