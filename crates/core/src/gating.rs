use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::index::GlobalIndex;
use crate::model::{GlobalId, LessonKey};
use crate::progress::ProgressState;
use crate::quiz::PASS_PERCENT_LABEL;

/// How long a denial or status notice stays visible.
pub const NOTICE_TTL_MS: i64 = 2_500;

//
// ─── DENIALS ───────────────────────────────────────────────────────────────────
//

/// Why a selection or navigation step was refused. `Display` is user-facing.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Denial {
    #[error("Invalid video")]
    UnknownLesson,

    #[error(
        "Complete quiz for Video ID {} (pass ≥{}) to unlock Video ID {}.",
        .target.value() - 1,
        PASS_PERCENT_LABEL,
        .target
    )]
    Locked { target: GlobalId },

    #[error("Locked. Pass quiz for Video ID {current} to unlock next.")]
    NextLocked { current: GlobalId },

    #[error("Already at the last video.")]
    EndOfCourse,

    #[error("Already at the first video.")]
    StartOfCourse,
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Read-only view deciding which lessons may be opened.
#[derive(Debug, Clone, Copy)]
pub struct Gate<'a> {
    index: &'a GlobalIndex,
    progress: &'a ProgressState,
}

impl<'a> Gate<'a> {
    #[must_use]
    pub fn new(index: &'a GlobalIndex, progress: &'a ProgressState) -> Self {
        Self { index, progress }
    }

    #[must_use]
    pub fn can_select(&self, key: LessonKey) -> bool {
        self.check_select(key).is_ok()
    }

    /// Returns the lesson's id when it may be opened.
    ///
    /// # Errors
    ///
    /// `Denial::UnknownLesson` for positions outside the roadmap,
    /// `Denial::Locked` for lessons beyond the unlock frontier.
    pub fn check_select(&self, key: LessonKey) -> Result<GlobalId, Denial> {
        let id = self.index.global_id(key).ok_or(Denial::UnknownLesson)?;
        if id <= self.progress.highest_unlocked() {
            Ok(id)
        } else {
            Err(Denial::Locked { target: id })
        }
    }

    /// Target of a "next" step from `current`.
    ///
    /// # Errors
    ///
    /// `Denial::EndOfCourse` past the last lesson, `Denial::NextLocked` when the
    /// next lesson is not yet unlocked.
    pub fn next_from(&self, current: GlobalId) -> Result<LessonKey, Denial> {
        let next = current.next();
        if next.value() > self.index.total() {
            return Err(Denial::EndOfCourse);
        }
        if next > self.progress.highest_unlocked() {
            return Err(Denial::NextLocked { current });
        }
        self.index.key_of(next).ok_or(Denial::UnknownLesson)
    }

    /// Target of a "previous" step. Going back is never gated by locks.
    ///
    /// # Errors
    ///
    /// `Denial::StartOfCourse` when already at the first lesson.
    pub fn previous_from(&self, current: GlobalId) -> Result<LessonKey, Denial> {
        let prev = current.prev().ok_or(Denial::StartOfCourse)?;
        self.index.key_of(prev).ok_or(Denial::UnknownLesson)
    }

    #[must_use]
    pub fn has_next(&self, current: GlobalId) -> bool {
        self.next_from(current).is_ok()
    }
}

//
// ─── CURSOR ────────────────────────────────────────────────────────────────────
//

/// Generation counter identifying "the lesson that was current" when an async
/// request started. Results carrying an older token are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LessonToken(u64);

/// The currently open lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LessonCursor {
    key: LessonKey,
    token: LessonToken,
}

impl Default for LessonCursor {
    fn default() -> Self {
        Self {
            key: LessonKey::new(0, 0),
            token: LessonToken::default(),
        }
    }
}

impl LessonCursor {
    #[must_use]
    pub fn key(&self) -> LessonKey {
        self.key
    }

    #[must_use]
    pub fn token(&self) -> LessonToken {
        self.token
    }

    /// Current id, falling back to 1 when the cursor is outside the index.
    #[must_use]
    pub fn global_id(&self, index: &GlobalIndex) -> GlobalId {
        index.global_id(self.key).unwrap_or(GlobalId::FIRST)
    }

    /// Move to `key`, invalidating every in-flight request for the old lesson.
    pub fn move_to(&mut self, key: LessonKey) {
        self.key = key;
        self.token = LessonToken(self.token.0.wrapping_add(1));
    }

    #[must_use]
    pub fn is_current(&self, token: LessonToken) -> bool {
        self.token == token
    }
}

//
// ─── NOTICES ───────────────────────────────────────────────────────────────────
//

/// A transient message that clears itself after [`NOTICE_TTL_MS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    text: String,
    expires_at: DateTime<Utc>,
}

impl Notice {
    #[must_use]
    pub fn new(text: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            expires_at: now + Duration::milliseconds(NOTICE_TTL_MS),
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
