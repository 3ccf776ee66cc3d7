use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::model::ids::LessonKey;

/// Placeholder the backend emits when no video could be matched to a topic.
pub const NO_VIDEO: &str = "No video found";

//
// ─── VIDEO REF ─────────────────────────────────────────────────────────────────
//

/// Reference to the video backing a lesson.
///
/// Per-lesson caches (quiz, transcript, summary, mindmap) are keyed by this value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VideoRef {
    Url(String),
    Missing,
}

impl VideoRef {
    /// Normalizes a raw backend value; blanks, `"none"` and the placeholder map to `Missing`.
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == NO_VIDEO || trimmed.eq_ignore_ascii_case("none") {
            Self::Missing
        } else {
            Self::Url(trimmed.to_owned())
        }
    }

    #[must_use]
    pub fn as_url(&self) -> Option<&str> {
        match self {
            Self::Url(url) => Some(url),
            Self::Missing => None,
        }
    }

    /// Wire representation, with `Missing` rendered as the backend placeholder.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.as_url().unwrap_or(NO_VIDEO)
    }

    /// Embeddable player URL for `watch?v=` style links.
    #[must_use]
    pub fn embed_url(&self) -> Option<String> {
        let parsed = Url::parse(self.as_url()?).ok()?;
        let id = parsed
            .query_pairs()
            .find(|(name, _)| name == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|value| !value.is_empty())?;
        Some(format!("https://www.youtube.com/embed/{id}"))
    }
}

impl Serialize for VideoRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for VideoRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.map_or(Self::Missing, |raw| Self::from_raw(&raw)))
    }
}

//
// ─── ROADMAP ───────────────────────────────────────────────────────────────────
//

/// A single lesson (one video plus its topic).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(default)]
    pub topic: String,
    #[serde(default = "missing_video")]
    pub video: VideoRef,
}

fn missing_video() -> VideoRef {
    VideoRef::Missing
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Week {
    pub label: String,
    pub lessons: Vec<Lesson>,
}

/// Ordered weeks of ordered lessons. Immutable once built for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roadmap {
    weeks: Vec<Week>,
}

impl Roadmap {
    #[must_use]
    pub fn new(weeks: Vec<Week>) -> Self {
        Self { weeks }
    }

    /// Builds a roadmap from the backend `videos` payload:
    /// `[{"Week 1": [{"topic": "...", "video": "..."}]}, ...]`.
    ///
    /// Malformed week entries keep their slot with no lessons, so week indices
    /// stay aligned with the payload while global numbering skips them.
    #[must_use]
    pub fn from_videos_json(videos: &Value) -> Self {
        let Some(entries) = videos.as_array() else {
            return Self::default();
        };

        let weeks = entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| {
                let first = entry.as_object().and_then(|obj| obj.iter().next());
                let label = first.map_or_else(|| format!("Week {}", idx + 1), |(k, _)| k.clone());
                let lessons = first
                    .and_then(|(_, v)| v.as_array())
                    .map(|items| items.iter().map(parse_lesson).collect())
                    .unwrap_or_default();
                Week { label, lessons }
            })
            .collect();

        Self { weeks }
    }

    #[must_use]
    pub fn weeks(&self) -> &[Week] {
        &self.weeks
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.weeks.iter().all(|w| w.lessons.is_empty())
    }

    #[must_use]
    pub fn lesson(&self, key: LessonKey) -> Option<&Lesson> {
        self.weeks.get(key.week)?.lessons.get(key.lesson)
    }
}

fn parse_lesson(item: &Value) -> Lesson {
    serde_json::from_value(item.clone()).unwrap_or_else(|_| Lesson {
        topic: item
            .get("topic")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        video: VideoRef::Missing,
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
