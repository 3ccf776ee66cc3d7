use thiserror::Error;

use crate::gating::Denial;
use crate::model::ParseIdError;
use crate::progress::ProgressError;
use crate::quiz::{QuizBlocked, QuizError};

/// Umbrella for every domain error, for callers that do not branch on the kind.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Progress(#[from] ProgressError),
    #[error(transparent)]
    Denied(#[from] Denial),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    QuizBlocked(#[from] QuizBlocked),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
}
