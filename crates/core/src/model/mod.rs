mod course;
mod ids;
mod quiz;
mod roadmap;

pub use course::{CourseState, DEFAULT_SUMMARY_TYPE, LearnerProfile};
pub use ids::{GlobalId, LessonKey, ParseIdError, QuizId};
pub use quiz::{QuizContent, QuizGrade, QuizQuestion};
pub use roadmap::{Lesson, NO_VIDEO, Roadmap, VideoRef, Week};
