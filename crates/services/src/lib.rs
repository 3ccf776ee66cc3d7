#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
pub mod content;
pub mod error;
pub mod identity;
pub mod persistence;
pub mod player;
pub mod quiz_flow;

pub use zenith_core::Clock;

pub use backend::{CourseBackend, HttpBackend, InMemoryBackend, TranscriptReply};
pub use config::{BackendConfig, EngineConfig};
pub use content::{ContentService, LessonContext, Tagged};
pub use error::{BackendError, ConfigError, PlayerError};
pub use identity::{IdentityProvider, StaticIdentity};
pub use persistence::{Hydration, ProgressMirror, SaveReason};
pub use player::{CoursePlayer, LessonStatus, LessonView, PlayerDeps, SubmitReport};
pub use quiz_flow::{QuizFlow, SubmitOutcome};
