//! Build orchestration: state store, freshness cache, queue, runner,
//! progress events.

pub mod events;
pub mod freshness;
pub mod model;
pub mod queue;
pub mod runner;
pub mod store;

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::BuildConfig;
use crate::project::ProjectStore;

use self::events::EventSink;
use self::model::{BuildStatusSnapshot, EnqueueOutcome};
use self::queue::BuildQueue;
use self::store::BuildStateStore;

/// Facade over the build subsystem — the surface the orchestration and
/// transport collaborators call.
pub struct BuildService {
    store: Arc<BuildStateStore>,
    projects: Arc<ProjectStore>,
    queue: BuildQueue,
}

impl BuildService {
    /// Wire the store, runner, and dispatcher. `sink` is the producer side
    /// of the event channel; the broadcaster loop drains the other end.
    pub fn start(projects: Arc<ProjectStore>, config: BuildConfig, sink: EventSink) -> Self {
        let store = Arc::new(BuildStateStore::new());
        let queue = BuildQueue::start(
            Arc::clone(&store),
            Arc::clone(&projects),
            config,
            sink,
        );
        Self {
            store,
            projects,
            queue,
        }
    }

    /// Queue a build for a session. See [`BuildQueue::enqueue`].
    pub async fn enqueue_build(&self, session_id: &str, force_rebuild: bool) -> EnqueueOutcome {
        self.queue.enqueue(session_id, force_rebuild).await
    }

    /// Current status, error, duration, and bounded log tail.
    pub fn build_status(&self, session_id: &str) -> BuildStatusSnapshot {
        self.store.snapshot(session_id)
    }

    /// Full retained log for a session, oldest first.
    pub fn build_logs(&self, session_id: &str) -> Vec<String> {
        self.store.logs(session_id)
    }

    /// Whether a build output exists on disk for this session.
    pub fn is_built(&self, session_id: &str) -> bool {
        freshness::is_built(&self.projects.project_path(session_id))
    }

    /// Path to the built output directory, if present.
    pub fn artifact_path(&self, session_id: &str) -> Option<PathBuf> {
        let dist = self.projects.dist_path(session_id);
        dist.is_dir().then_some(dist)
    }

    /// Drop the session's build record (project deleted externally).
    pub fn forget(&self, session_id: &str) {
        self.store.forget(session_id);
    }

    /// Stop accepting new jobs. In-flight builds run to completion.
    pub fn shutdown(&self) {
        self.queue.shutdown();
    }
}
