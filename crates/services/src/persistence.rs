use std::sync::Arc;
use std::time::Duration;

use storage::{CacheKey, ProgressCache};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zenith_core::progress::ProgressSnapshot;

use crate::backend::CourseBackend;

/// Why a save was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    /// Routine state change; the remote write is coalesced.
    Debounced,
    /// Quiz result; written through before returning.
    Immediate,
}

/// Result of asking the remote store for the authoritative snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Hydration {
    Remote(ProgressSnapshot),
    NotFound,
    /// The remote could not be read; the local view stays in effect.
    Failed,
}

struct PendingSave {
    handle: JoinHandle<()>,
    snapshot: ProgressSnapshot,
}

/// Keeps the local progress cache and the remote progress store in step.
///
/// Every save lands in the local cache first. Remote writes are debounced
/// for routine changes and written through for quiz results. Remote
/// failures are logged and never retried; the next save carries the full
/// snapshot anyway.
pub struct ProgressMirror {
    key: CacheKey,
    cache: Arc<dyn ProgressCache>,
    backend: Arc<dyn CourseBackend>,
    debounce: Duration,
    hydrated: bool,
    pending: Option<PendingSave>,
}

impl ProgressMirror {
    #[must_use]
    pub fn new(
        key: CacheKey,
        cache: Arc<dyn ProgressCache>,
        backend: Arc<dyn CourseBackend>,
        debounce: Duration,
    ) -> Self {
        Self {
            key,
            cache,
            backend,
            debounce,
            hydrated: false,
            pending: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// True once the remote store has been consulted, whatever the outcome.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.hydrated
    }

    /// Provisional snapshot from the local cache.
    pub async fn load_local(&self) -> Option<ProgressSnapshot> {
        match self.cache.get_progress(&self.key).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(course = %self.key.course_title(), error = %err, "local progress unreadable");
                None
            }
        }
    }

    /// Fetch the authoritative snapshot and mark the mirror hydrated.
    ///
    /// A failed fetch still counts as hydrated so later changes are saved.
    pub async fn load_remote(&mut self) -> Hydration {
        let result = self.backend.load_progress(self.key.course_title()).await;
        self.hydrated = true;
        match result {
            Ok(Some(snapshot)) => {
                self.write_local(&snapshot).await;
                Hydration::Remote(snapshot)
            }
            Ok(None) => Hydration::NotFound,
            Err(err) => {
                warn!(course = %self.key.course_title(), error = %err, "remote progress unavailable");
                Hydration::Failed
            }
        }
    }

    pub async fn save(&mut self, snapshot: ProgressSnapshot, reason: SaveReason) {
        self.write_local(&snapshot).await;
        match reason {
            SaveReason::Debounced => self.schedule_remote(snapshot),
            SaveReason::Immediate => {
                self.cancel_pending();
                self.write_remote(&snapshot).await;
            }
        }
    }

    /// Write out a still-pending debounced save right away.
    pub async fn flush(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        if pending.handle.is_finished() {
            return;
        }
        pending.handle.abort();
        self.write_remote(&pending.snapshot).await;
    }

    /// True while a debounced remote write is waiting to fire.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| !pending.handle.is_finished())
    }

    fn schedule_remote(&mut self, snapshot: ProgressSnapshot) {
        if !self.hydrated {
            debug!(course = %self.key.course_title(), "not hydrated yet, remote save skipped");
            return;
        }
        self.cancel_pending();

        let backend = Arc::clone(&self.backend);
        let course = self.key.course_title().to_owned();
        let delay = self.debounce;
        let to_send = snapshot.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(err) = backend.save_progress(&course, &to_send).await {
                warn!(%course, error = %err, "debounced progress save failed");
            }
        });
        self.pending = Some(PendingSave { handle, snapshot });
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }

    async fn write_local(&self, snapshot: &ProgressSnapshot) {
        if let Err(err) = self.cache.put_progress(&self.key, snapshot).await {
            warn!(course = %self.key.course_title(), error = %err, "local progress write failed");
        }
    }

    async fn write_remote(&self, snapshot: &ProgressSnapshot) {
        if let Err(err) = self
            .backend
            .save_progress(self.key.course_title(), snapshot)
            .await
        {
            warn!(course = %self.key.course_title(), error = %err, "progress save failed");
        }
    }
}

impl Drop for ProgressMirror {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}
