use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use zenith_core::model::{
    CourseState, LearnerProfile, QuizContent, QuizGrade, QuizId, Roadmap, VideoRef,
};
use zenith_core::progress::ProgressSnapshot;

use super::wire::{
    CompletionBody, CompletionMarker, CourseStateReply, CourseTitleBody, ErrorReply,
    GenerateQuizBody, GenerateQuizReply, MindmapBody, MindmapReply, ProgressReply,
    SaveProgressBody, SubmitQuizBody, SummaryBody, SummaryReply, TranscriptBody,
    TranscriptReply as TranscriptWire,
};
use super::{
    CourseBackend, MindmapRequest, QuizRequest, QuizSubmission, SummaryRequest, TranscriptReply,
};
use crate::config::BackendConfig;
use crate::error::BackendError;
use crate::identity::{IdentityProvider, require_token};

/// JSON-over-HTTP client for the course backend with ordered base failover.
#[derive(Clone)]
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
    identity: Arc<dyn IdentityProvider>,
}

impl HttpBackend {
    #[must_use]
    pub fn new(config: BackendConfig, identity: Arc<dyn IdentityProvider>) -> Self {
        Self {
            client: Client::new(),
            config,
            identity,
        }
    }

    /// POST `body` to `path` and decode a successful reply.
    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, BackendError>
    where
        B: Serialize + Sync + ?Sized,
        R: DeserializeOwned,
    {
        self.post_checked(path, body)
            .await?
            .json::<R>()
            .await
            .map_err(|err| BackendError::InvalidResponse(format!("{path}: {err}")))
    }

    /// POST where only the status matters; the reply body is ignored.
    async fn post_ack<B>(&self, path: &str, body: &B) -> Result<(), BackendError>
    where
        B: Serialize + Sync + ?Sized,
    {
        self.post_checked(path, body).await.map(drop)
    }

    /// Non-success replies become `BackendError::Rejected` carrying the
    /// backend's `error` message when present.
    async fn post_checked<B>(&self, path: &str, body: &B) -> Result<Response, BackendError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let token = require_token(self.identity.as_ref()).await?;
        let response = self.send_with_failover(path, &token, body).await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .json::<ErrorReply>()
            .await
            .ok()
            .and_then(|reply| reply.error)
            .unwrap_or_else(|| format!("HTTP {status}"));
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message,
        })
    }

    /// Try each base in order. A reply below 500 is final; server errors and
    /// transport failures move on to the next base.
    async fn send_with_failover<B>(
        &self,
        path: &str,
        token: &str,
        body: &B,
    ) -> Result<Response, BackendError>
    where
        B: Serialize + Sync + ?Sized,
    {
        let bases = self.config.bases();
        if bases.is_empty() {
            return Err(BackendError::NoBackends);
        }

        let mut last = String::new();
        for base in bases {
            let url = BackendConfig::endpoint(base, path);
            match self
                .client
                .post(&url)
                .bearer_auth(token)
                .json(body)
                .send()
                .await
            {
                Ok(response) if response.status().is_server_error() => {
                    warn!(%url, status = %response.status(), "backend server error, trying next base");
                    last = format!("HTTP {}", response.status());
                }
                Ok(response) => {
                    debug!(%url, status = %response.status(), "backend replied");
                    return Ok(response);
                }
                Err(err) => {
                    warn!(%url, error = %err, "backend unreachable, trying next base");
                    last = err.to_string();
                }
            }
        }

        Err(BackendError::Unavailable {
            attempts: bases.len(),
            last,
        })
    }
}

#[async_trait]
impl CourseBackend for HttpBackend {
    async fn load_course_state(
        &self,
        course_title: &str,
    ) -> Result<Option<CourseState>, BackendError> {
        let reply: CourseStateReply = self
            .post("/course/state/get", &CourseTitleBody { course_title })
            .await?;
        let Some(state) = reply.state.filter(|_| reply.found) else {
            return Ok(None);
        };
        let profile = state
            .form_data
            .unwrap_or_else(|| LearnerProfile::for_subject(course_title));
        Ok(Some(CourseState::new(
            state.roadmap,
            Roadmap::from_videos_json(&state.videos),
            profile,
        )))
    }

    async fn load_progress(
        &self,
        course_title: &str,
    ) -> Result<Option<ProgressSnapshot>, BackendError> {
        let reply: ProgressReply = self
            .post("/course/progress/get", &CourseTitleBody { course_title })
            .await?;
        Ok(reply.progress.filter(|_| reply.found))
    }

    async fn save_progress(
        &self,
        course_title: &str,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), BackendError> {
        let body = SaveProgressBody {
            course_title,
            progress: snapshot,
        };
        self.post_ack("/course/progress/save", &body).await
    }

    async fn generate_quiz(&self, request: &QuizRequest) -> Result<QuizContent, BackendError> {
        let body = GenerateQuizBody {
            transcript: &request.transcript,
            video_url: request.video.as_str(),
            course_title: &request.course_title,
        };
        let reply: GenerateQuizReply = self.post("/generate-mcq", &body).await?;
        let quiz_id = reply
            .quiz_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| BackendError::InvalidResponse("quiz reply without quiz_id".into()))?;
        Ok(QuizContent {
            quiz_id: QuizId::new(quiz_id),
            questions: reply.questions,
        })
    }

    async fn submit_quiz(&self, submission: &QuizSubmission) -> Result<QuizGrade, BackendError> {
        let body = SubmitQuizBody {
            quiz_id: submission.quiz_id.as_str(),
            answers: &submission.answers,
            course_title: &submission.course_title,
            video_no: submission.video_no,
            total_videos: submission.total_videos,
        };
        self.post("/submit-quiz", &body).await
    }

    async fn fetch_transcript(&self, video: &VideoRef) -> Result<TranscriptReply, BackendError> {
        let body = TranscriptBody {
            url: video.as_str(),
        };
        let reply: TranscriptWire = self.post("/get-transcript", &body).await?;
        Ok(match (reply.transcript, reply.job_id) {
            (Some(text), _) if !text.is_empty() => TranscriptReply::Ready(text),
            (_, Some(_)) => TranscriptReply::Processing,
            _ => TranscriptReply::Unavailable,
        })
    }

    async fn summarize(&self, request: &SummaryRequest) -> Result<String, BackendError> {
        let body = SummaryBody {
            transcript: &request.transcript,
            summary_type: &request.summary_type,
            video_url: request.video.as_str(),
        };
        let reply: SummaryReply = self.post("/summarize", &body).await?;
        Ok(reply.summary.unwrap_or_default())
    }

    async fn generate_mindmap(&self, request: &MindmapRequest) -> Result<Value, BackendError> {
        let body = MindmapBody {
            video_url: request.video.as_str(),
            transcript: &request.transcript,
            title: &request.title,
            course_title: &request.course_title,
            force: request.force,
        };
        let reply: MindmapReply = self.post("/generate-mindmap", &body).await?;
        reply
            .tree
            .filter(|tree| !tree.is_null())
            .ok_or_else(|| BackendError::InvalidResponse("mindmap reply without tree".into()))
    }

    async fn mark_completed(&self, course_title: &str, video: &VideoRef) -> Result<(), BackendError> {
        let body = CompletionBody {
            course_title,
            video_url: video.as_str(),
            progress: CompletionMarker::finished(),
        };
        self.post_ack("/progress/upsert", &body).await
    }
}
