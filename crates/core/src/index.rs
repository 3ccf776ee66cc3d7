use std::collections::HashMap;

use crate::model::{GlobalId, LessonKey, Roadmap};

/// Bidirectional map between structural lesson keys and 1-based global ids.
///
/// Ids are assigned by walking weeks in order, then lessons within each week,
/// so the mapping is a pure function of the roadmap's shape. Ids are contiguous
/// from 1 to [`GlobalIndex::total`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalIndex {
    by_key: HashMap<LessonKey, GlobalId>,
    // position `i` holds the key of GlobalId `i + 1`
    by_id: Vec<LessonKey>,
}

impl GlobalIndex {
    #[must_use]
    pub fn build(roadmap: &Roadmap) -> Self {
        let mut index = Self::default();
        for (week_idx, week) in roadmap.weeks().iter().enumerate() {
            for lesson_idx in 0..week.lessons.len() {
                let key = LessonKey::new(week_idx, lesson_idx);
                index.by_id.push(key);
                let id = GlobalId::new(index.total());
                index.by_key.insert(key, id);
            }
        }
        index
    }

    /// Number of lessons in the roadmap.
    #[must_use]
    pub fn total(&self) -> u32 {
        u32::try_from(self.by_id.len()).unwrap_or(u32::MAX)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    #[must_use]
    pub fn global_id(&self, key: LessonKey) -> Option<GlobalId> {
        self.by_key.get(&key).copied()
    }

    #[must_use]
    pub fn key_of(&self, id: GlobalId) -> Option<LessonKey> {
        let pos = usize::try_from(id.value()).ok()?.checked_sub(1)?;
        self.by_id.get(pos).copied()
    }

    /// Global ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = GlobalId> + '_ {
        (1..=self.total()).map(GlobalId::new)
    }

    /// `(id, key)` pairs in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = (GlobalId, LessonKey)> + '_ {
        self.ids().zip(self.by_id.iter().copied())
    }

    /// Last lesson id, or `None` for an empty roadmap.
    #[must_use]
    pub fn last(&self) -> Option<GlobalId> {
        (!self.is_empty()).then(|| GlobalId::new(self.total()))
    }
}
