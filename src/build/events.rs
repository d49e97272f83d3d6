// SPDX-License-Identifier: MIT
//! Build progress events and the channel producers write them to.
//!
//! The runner never touches subscribers directly: it emits into an
//! unbounded channel whose consumer is the broadcaster loop
//! (`crate::broadcast::spawn_broadcaster`), so a slow or dead viewer can
//! never stall a build.

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Kind of a build event, as delivered to viewers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A log line was appended mid-build.
    Progress,
    /// The pipeline finished successfully.
    Completed,
    /// The pipeline ended in a terminal error.
    Error,
}

/// One event as fanned out to a session's subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct BuildEvent {
    pub id: String,
    pub kind: EventKind,
    pub session_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub payload: Value,
}

impl BuildEvent {
    fn new(kind: EventKind, session_id: &str, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            session_id: session_id.to_string(),
            timestamp: Utc::now().timestamp_millis(),
            payload,
        }
    }

    pub fn progress(session_id: &str, message: &str, logs_tail: &[String]) -> Self {
        Self::new(
            EventKind::Progress,
            session_id,
            json!({
                "message": message,
                "logs_tail": logs_tail,
            }),
        )
    }

    pub fn completed(session_id: &str, build_time_seconds: f64) -> Self {
        Self::new(
            EventKind::Completed,
            session_id,
            json!({
                "build_time_seconds": build_time_seconds,
                "message": format!("Build completed successfully in {build_time_seconds:.2}s"),
            }),
        )
    }

    pub fn error(session_id: &str, error: &str) -> Self {
        Self::new(
            EventKind::Error,
            session_id,
            json!({ "error": error }),
        )
    }
}

/// Producer handle for the build event channel. Cloned into the queue
/// dispatcher and every runner task. Emitting is fire-and-forget: if the
/// broadcaster is gone (shutdown), the event is dropped.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<BuildEvent>,
}

impl EventSink {
    /// Create the channel; the receiver goes to the broadcaster loop.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<BuildEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: BuildEvent) {
        let _ = self.tx.send(event);
    }
}
