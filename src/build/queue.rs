// SPDX-License-Identifier: MIT
//! Build intake queue and background dispatcher.
//!
//! `enqueue` coalesces redundant requests (already building, output
//! current) and pushes runnable jobs onto an unbounded channel. A single
//! dispatcher loop receives jobs FIFO; the Idle→Building transition is one
//! compare-and-swap inside the store at job start, so duplicate jobs that
//! survive enqueue-time triage are dropped here, and two pipelines can
//! never run for the same session. Dispatch itself is non-blocking: each
//! job runs on its own task, one in-flight build per session, with no
//! global cap across sessions (a hardening candidate, left uncapped as in
//! the upstream service).

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::project::ProjectStore;

use super::events::EventSink;
use super::freshness;
use super::model::{BuildJob, BuildStatus, EnqueueOutcome};
use super::runner::BuildRunner;
use super::store::BuildStateStore;

pub struct BuildQueue {
    store: Arc<BuildStateStore>,
    projects: Arc<ProjectStore>,
    tx: mpsc::UnboundedSender<BuildJob>,
    dispatcher: JoinHandle<()>,
}

impl BuildQueue {
    /// Create the queue and start its dispatcher loop.
    pub fn start(
        store: Arc<BuildStateStore>,
        projects: Arc<ProjectStore>,
        config: BuildConfig,
        sink: EventSink,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let runner = Arc::new(BuildRunner::new(
            Arc::clone(&store),
            Arc::clone(&projects),
            config,
            sink,
        ));
        let dispatcher = tokio::spawn(dispatch_loop(rx, Arc::clone(&store), runner));
        Self {
            store,
            projects,
            tx,
            dispatcher,
        }
    }

    /// Queue a build (non-blocking). Returns immediately; the build runs
    /// in the background and progress is observable via status snapshots
    /// and the event stream.
    pub async fn enqueue(&self, session_id: &str, force_rebuild: bool) -> EnqueueOutcome {
        if self.store.status(session_id) == BuildStatus::Building {
            debug!(session_id, "enqueue coalesced — build already in progress");
            return EnqueueOutcome::AlreadyBuilding;
        }

        if !force_rebuild && self.output_is_current(session_id).await {
            debug!(session_id, "enqueue skipped — output is current");
            return EnqueueOutcome::Cached;
        }

        self.store.mark_pending(session_id);
        let job = BuildJob {
            session_id: session_id.to_string(),
            force_rebuild,
        };
        if self.tx.send(job).is_err() {
            // Dispatcher gone — only happens during shutdown.
            warn!(session_id, "build queue is shut down — job dropped");
        } else {
            info!(session_id, force_rebuild, "build queued");
        }
        EnqueueOutcome::Queued
    }

    /// Freshness scan walks the source tree — run it on the blocking pool.
    async fn output_is_current(&self, session_id: &str) -> bool {
        let project_path = self.projects.project_path(session_id);
        tokio::task::spawn_blocking(move || freshness::output_is_current(&project_path))
            .await
            .unwrap_or(false)
    }

    /// Abort the dispatcher. In-flight builds keep running to completion
    /// or phase timeout; only intake stops.
    pub fn shutdown(&self) {
        self.dispatcher.abort();
    }
}

async fn dispatch_loop(
    mut rx: mpsc::UnboundedReceiver<BuildJob>,
    store: Arc<BuildStateStore>,
    runner: Arc<BuildRunner>,
) {
    while let Some(job) = rx.recv().await {
        // Single atomic Idle→Building transition at job start. A job that
        // loses the race was a duplicate request; drop it.
        if !store.try_begin(&job.session_id) {
            debug!(session_id = %job.session_id, "duplicate job dropped at dispatch");
            continue;
        }
        let runner = Arc::clone(&runner);
        tokio::spawn(async move {
            runner.execute(job).await;
        });
    }
}
