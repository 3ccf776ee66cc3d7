use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::roadmap::Roadmap;

/// Summary style used when the learner did not pick one.
pub const DEFAULT_SUMMARY_TYPE: &str = "Paragraph";

/// Answers from the course creation form, stored alongside the roadmap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LearnerProfile {
    pub age: String,
    pub duration: String,
    pub pace: String,
    pub level: String,
    pub experience: String,
    pub summary_type: String,
    pub goal: String,
    pub subject: String,
}

impl LearnerProfile {
    /// Profile for a course opened without saved form data.
    #[must_use]
    pub fn for_subject(subject: &str) -> Self {
        Self {
            subject: subject.trim().to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn summary_type(&self) -> &str {
        let trimmed = self.summary_type.trim();
        if trimmed.is_empty() {
            DEFAULT_SUMMARY_TYPE
        } else {
            trimmed
        }
    }
}

/// Saved state of a generated course.
///
/// `plan` is the free-form weekly plan text the generator produced; it is kept
/// opaque. `roadmap` is the structured weeks/videos list lessons are indexed from.
#[derive(Debug, Clone, PartialEq)]
pub struct CourseState {
    pub plan: Value,
    pub roadmap: Roadmap,
    pub profile: LearnerProfile,
}

impl CourseState {
    #[must_use]
    pub fn new(plan: Value, roadmap: Roadmap, profile: LearnerProfile) -> Self {
        Self {
            plan,
            roadmap,
            profile,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_type_defaults_to_paragraph() {
        let profile = LearnerProfile::for_subject("  Rust ");
        assert_eq!(profile.subject, "Rust");
        assert_eq!(profile.summary_type(), DEFAULT_SUMMARY_TYPE);
    }

    #[test]
    fn profile_tolerates_partial_json() {
        let profile: LearnerProfile =
            serde_json::from_str(r#"{"summaryType":"Bullets","goal":"job"}"#).unwrap();
        assert_eq!(profile.summary_type(), "Bullets");
        assert_eq!(profile.goal, "job");
        assert!(profile.age.is_empty());
    }
}
