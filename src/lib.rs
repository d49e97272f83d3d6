pub mod broadcast;
pub mod build;
pub mod config;
pub mod error;
pub mod project;
pub mod watch;

use std::sync::Arc;

use anyhow::{Context as _, Result};

use broadcast::BroadcastHub;
use build::events::EventSink;
use build::BuildService;
use config::DaemonConfig;
use project::ProjectStore;
use watch::FileWatchDebouncer;

/// Shared application state handed to transport handlers and background
/// tasks.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub projects: Arc<ProjectStore>,
    pub builds: Arc<BuildService>,
    pub watcher: Arc<FileWatchDebouncer>,
    pub hub: Arc<BroadcastHub>,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire the whole core: state store → event channel → queue dispatcher
    /// → broadcaster loop → file watcher (whose change callback feeds the
    /// queue).
    pub fn initialize(config: Arc<DaemonConfig>) -> Result<Self> {
        std::fs::create_dir_all(&config.projects_dir).with_context(|| {
            format!(
                "cannot create projects directory {}",
                config.projects_dir.display()
            )
        })?;

        let projects = Arc::new(ProjectStore::new(config.projects_dir.clone()));
        let hub = Arc::new(BroadcastHub::new());

        let (sink, events_rx) = EventSink::channel();
        broadcast::spawn_broadcaster(Arc::clone(&hub), events_rx);

        let builds = Arc::new(BuildService::start(
            Arc::clone(&projects),
            config.build.clone(),
            sink,
        ));

        // A debounced change enqueues a non-forced rebuild; the queue's
        // AlreadyBuilding/Cached triage absorbs multi-file bursts.
        let builds_for_watch = Arc::clone(&builds);
        let on_change: watch::ChangeCallback = Arc::new(move |session_id: &str| {
            let builds = Arc::clone(&builds_for_watch);
            let session_id = session_id.to_string();
            tokio::spawn(async move {
                builds.enqueue_build(&session_id, false).await;
            });
        });
        let watcher = Arc::new(FileWatchDebouncer::new(
            Arc::clone(&projects),
            config.debounce_window(),
            on_change,
        ));

        Ok(Self {
            config,
            projects,
            builds,
            watcher,
            hub,
            started_at: std::time::Instant::now(),
        })
    }

    /// Remove a session entirely: stop its watch, delete the project tree,
    /// and drop the build record. In-flight builds run to completion (or
    /// phase timeout) and will fail loudly against the missing tree.
    pub async fn delete_session(&self, session_id: &str) -> Result<()> {
        self.watcher.stop_watching(session_id);
        self.projects.delete_project(session_id).await?;
        self.builds.forget(session_id);
        Ok(())
    }

    /// Stop intake and watches. Running builds are not cancelled.
    pub fn shutdown(&self) {
        self.watcher.stop_all();
        self.builds.shutdown();
    }
}
