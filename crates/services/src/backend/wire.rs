//! JSON bodies exchanged with the course backend.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use zenith_core::model::{LearnerProfile, QuizQuestion};
use zenith_core::progress::ProgressSnapshot;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CourseTitleBody<'a> {
    pub course_title: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CourseStateReply {
    #[serde(default)]
    pub found: bool,
    pub state: Option<CourseStateBody>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CourseStateBody {
    #[serde(default)]
    pub roadmap: Value,
    #[serde(default)]
    pub videos: Value,
    pub form_data: Option<LearnerProfile>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProgressReply {
    #[serde(default)]
    pub found: bool,
    pub progress: Option<ProgressSnapshot>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SaveProgressBody<'a> {
    pub course_title: &'a str,
    pub progress: &'a ProgressSnapshot,
}

#[derive(Debug, Serialize)]
pub(crate) struct GenerateQuizBody<'a> {
    pub transcript: &'a str,
    pub video_url: &'a str,
    #[serde(rename = "courseTitle")]
    pub course_title: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GenerateQuizReply {
    pub quiz_id: Option<String>,
    #[serde(default)]
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SubmitQuizBody<'a> {
    pub quiz_id: &'a str,
    pub answers: &'a [String],
    #[serde(rename = "courseTitle")]
    pub course_title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_no: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_videos: Option<u32>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TranscriptBody<'a> {
    pub url: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TranscriptReply {
    pub transcript: Option<String>,
    pub job_id: Option<Value>,
}

#[derive(Debug, Serialize)]
pub(crate) struct SummaryBody<'a> {
    pub transcript: &'a str,
    #[serde(rename = "type")]
    pub summary_type: &'a str,
    pub video_url: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SummaryReply {
    pub summary: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct MindmapBody<'a> {
    pub video_url: &'a str,
    pub transcript: &'a str,
    pub title: &'a str,
    #[serde(rename = "courseTitle")]
    pub course_title: &'a str,
    pub force: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MindmapReply {
    pub tree: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompletionBody<'a> {
    pub course_title: &'a str,
    pub video_url: &'a str,
    pub progress: CompletionMarker,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CompletionMarker {
    pub percent: u8,
    pub completed: bool,
    pub quiz_passed: bool,
    pub current: u32,
}

impl CompletionMarker {
    pub(crate) fn finished() -> Self {
        Self {
            percent: 100,
            completed: true,
            quiz_passed: true,
            current: 0,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorReply {
    pub error: Option<String>,
}
