// SPDX-License-Identifier: MIT
//! Two-phase build pipeline: dependency install, then project build.
//!
//! Each phase is an external process with its own wall-clock budget. A
//! timed-out child is killed (`kill_on_drop`) so no process outlives its
//! phase. Every fault — nonzero exit, timeout, spawn error — becomes a
//! terminal Error on the session record; nothing propagates out of
//! `execute`, so the queue dispatcher can never be taken down by a build.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::BuildConfig;
use crate::error::{truncate_chars, BuildError, ERROR_PREVIEW_MAX_CHARS};
use crate::project::ProjectStore;

use super::events::{BuildEvent, EventSink};
use super::model::BuildJob;
use super::store::BuildStateStore;

/// How many trailing output lines of a failed phase land in the log.
const FAILURE_LOG_LINES: usize = 10;

pub struct BuildRunner {
    store: Arc<BuildStateStore>,
    projects: Arc<ProjectStore>,
    config: BuildConfig,
    sink: EventSink,
}

impl BuildRunner {
    pub fn new(
        store: Arc<BuildStateStore>,
        projects: Arc<ProjectStore>,
        config: BuildConfig,
        sink: EventSink,
    ) -> Self {
        Self {
            store,
            projects,
            config,
            sink,
        }
    }

    /// Run the pipeline for one job. The caller has already performed the
    /// atomic transition to Building. Infallible by design: every failure
    /// path ends in a terminal Error status plus an error event.
    pub async fn execute(&self, job: BuildJob) {
        let session_id = job.session_id.as_str();
        let started = Instant::now();

        match self.run_pipeline(&job).await {
            Ok(()) => {
                let build_time = started.elapsed().as_secs_f64();
                self.store.complete(session_id, build_time);
                self.log(session_id, format!("Build completed successfully in {build_time:.2}s"));
                self.sink.emit(BuildEvent::completed(session_id, build_time));
                info!(session_id, build_time_s = build_time, "build succeeded");
            }
            Err(err) => {
                let preview = err.preview();
                if let BuildError::ProcessFailure { full, .. } = &err {
                    self.append_failure_tail(session_id, full);
                }
                self.log(session_id, format!("Error: {preview}"));
                self.store.fail(session_id, &preview);
                self.sink.emit(BuildEvent::error(session_id, &preview));
                warn!(session_id, timeout = err.is_timeout(), err = %preview, "build failed");
            }
        }
    }

    async fn run_pipeline(&self, job: &BuildJob) -> Result<(), BuildError> {
        let session_id = job.session_id.as_str();
        let project_path = self.projects.project_path(session_id);
        if !project_path.is_dir() {
            return Err(BuildError::ProjectNotFound(session_id.to_string()));
        }

        self.log(session_id, "Build started");

        // The queue checked freshness at enqueue time; re-check here so a
        // build that completed between enqueue and dispatch is not redone.
        if !job.force_rebuild {
            let path = project_path.clone();
            let current =
                tokio::task::spawn_blocking(move || super::freshness::output_is_current(&path))
                    .await
                    .unwrap_or(false);
            if current {
                self.log(session_id, "Output already up to date");
                return Ok(());
            }
        }

        self.log(session_id, "Installing dependencies...");
        self.run_phase("install", &self.config.install_command, &project_path)
            .await?;
        self.log(session_id, "Dependencies installed successfully");

        self.log(session_id, "Building project...");
        self.run_phase("build", &self.config.build_command, &project_path)
            .await?;
        self.log(session_id, "Project built");

        Ok(())
    }

    /// Run one external command with the configured phase timeout.
    async fn run_phase(
        &self,
        phase: &'static str,
        argv: &[String],
        project_path: &Path,
    ) -> Result<(), BuildError> {
        let binary = argv
            .first()
            .ok_or_else(|| BuildError::Internal(format!("{phase} command is empty")))?;
        let timeout_secs = self.config.phase_timeout_secs;

        debug!(phase, command = %argv.join(" "), "running build phase");

        // kill_on_drop: when the timeout drops the output future, the
        // child is killed rather than leaked.
        let run = tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            Command::new(binary)
                .args(&argv[1..])
                .current_dir(project_path)
                .kill_on_drop(true)
                .output(),
        )
        .await;

        let output = match run {
            Ok(Ok(o)) => o,
            Ok(Err(e)) => {
                return Err(BuildError::Internal(format!(
                    "could not spawn {phase} command '{binary}': {e}"
                )))
            }
            Err(_) => {
                return Err(BuildError::Timeout {
                    phase,
                    timeout_secs,
                })
            }
        };

        if output.status.success() {
            return Ok(());
        }

        // Prefer stderr; fall back to stdout for tools that report there.
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let full = if stderr.trim().is_empty() {
            String::from_utf8_lossy(&output.stdout).into_owned()
        } else {
            stderr
        };

        Err(BuildError::ProcessFailure {
            phase,
            preview: truncate_chars(&full, ERROR_PREVIEW_MAX_CHARS),
            full,
        })
    }

    /// Append the last non-empty output lines of a failed phase to the log
    /// so the full diagnostic survives the truncated error preview.
    fn append_failure_tail(&self, session_id: &str, full: &str) {
        let lines: Vec<&str> = full.lines().filter(|l| !l.trim().is_empty()).collect();
        let start = lines.len().saturating_sub(FAILURE_LOG_LINES);
        for line in &lines[start..] {
            self.log(session_id, format!("  {line}"));
        }
    }

    /// Append a log line and emit the matching progress event.
    fn log(&self, session_id: &str, message: impl Into<String>) {
        let message = message.into();
        let tail = self.store.append_log(session_id, &message);
        self.sink
            .emit(BuildEvent::progress(session_id, &message, &tail));
    }
}
