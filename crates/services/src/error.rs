//! Shared error types for the services crate.

use thiserror::Error;

use zenith_core::gating::Denial;
use zenith_core::progress::ProgressError;
use zenith_core::quiz::{QuizBlocked, QuizError};

/// Marker the backend uses when a quiz id is no longer known server-side.
const EXPIRED_QUIZ_MARKER: &str = "invalid quiz_id";

/// Errors emitted by a `CourseBackend`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BackendError {
    #[error("Please login to continue.")]
    Unauthenticated,

    #[error("no backend base URL configured")]
    NoBackends,

    #[error("all {attempts} backends failed: {last}")]
    Unavailable { attempts: usize, last: String },

    #[error("{message}")]
    Rejected { status: u16, message: String },

    #[error("unexpected response: {0}")]
    InvalidResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

impl BackendError {
    /// True when the backend reports the submitted quiz id as expired.
    #[must_use]
    pub fn is_expired_quiz(&self) -> bool {
        matches!(
            self,
            BackendError::Rejected { message, .. }
                if message.to_lowercase().contains(EXPIRED_QUIZ_MARKER)
        )
    }

    /// Builds the rejection the backend returns for an unknown quiz id.
    #[must_use]
    pub fn expired_quiz() -> Self {
        BackendError::Rejected {
            status: 400,
            message: EXPIRED_QUIZ_MARKER.to_owned(),
        }
    }
}

/// Errors emitted while reading configuration from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid backend URL {raw:?}: {source}")]
    InvalidBaseUrl {
        raw: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{var} must be a non-negative integer, got {raw:?}")]
    InvalidNumber { var: &'static str, raw: String },
}

/// Errors emitted by `CoursePlayer` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PlayerError {
    #[error("course {0:?} was not found")]
    CourseNotFound(String),

    #[error("No video available")]
    NoVideo,

    #[error("Transcript not available yet")]
    TranscriptMissing,

    #[error(transparent)]
    Domain(#[from] zenith_core::Error),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl From<Denial> for PlayerError {
    fn from(err: Denial) -> Self {
        Self::Domain(err.into())
    }
}

impl From<QuizError> for PlayerError {
    fn from(err: QuizError) -> Self {
        Self::Domain(err.into())
    }
}

impl From<QuizBlocked> for PlayerError {
    fn from(err: QuizBlocked) -> Self {
        Self::Domain(err.into())
    }
}

impl From<ProgressError> for PlayerError {
    fn from(err: ProgressError) -> Self {
        Self::Domain(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_quiz_detection_is_case_insensitive() {
        let err = BackendError::Rejected {
            status: 400,
            message: "Invalid QUIZ_ID: abc".into(),
        };
        assert!(err.is_expired_quiz());
        assert!(BackendError::expired_quiz().is_expired_quiz());
        assert!(!BackendError::Unauthenticated.is_expired_quiz());
    }

    #[test]
    fn player_error_wraps_domain_errors() {
        let err: PlayerError = QuizError::NotReady.into();
        assert_eq!(err.to_string(), "Quiz not ready yet");
        assert!(matches!(
            err,
            PlayerError::Domain(zenith_core::Error::Quiz(QuizError::NotReady))
        ));
    }
}
