use serde::{Deserialize, Serialize};

use crate::model::ids::QuizId;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A generated multiple-choice quiz for one lesson video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizContent {
    pub quiz_id: QuizId,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

impl QuizContent {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// Backend verdict for a submitted attempt.
///
/// `attempts_left` is informational; reattempts are not limited client-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuizGrade {
    pub score: u32,
    #[serde(default)]
    pub attempts_left: Option<i64>,
    #[serde(default)]
    pub passed: bool,
    #[serde(default)]
    pub required: Option<u32>,
}
