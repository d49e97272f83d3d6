//! Build status and per-session record types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Most log lines retained per session; oldest are evicted first.
pub const LOG_CAPACITY: usize = 100;
/// Size of the externally exposed log tail (status snapshots, progress events).
pub const LOG_TAIL_LEN: usize = 20;

/// Lifecycle of one build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Building,
    Success,
    Error,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Building => "building",
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// Outcome of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnqueueOutcome {
    /// A build job was queued; status is now Pending.
    Queued,
    /// A build for this session is already in flight — request coalesced.
    AlreadyBuilding,
    /// Output is current per the freshness check; nothing to do.
    Cached,
}

/// A queued build request. Transient — owned by the queue channel between
/// enqueue and dispatch.
#[derive(Debug, Clone)]
pub struct BuildJob {
    pub session_id: String,
    pub force_rebuild: bool,
}

/// Per-session build bookkeeping. Mutated only by the queue and runner,
/// through [`super::store::BuildStateStore`].
#[derive(Debug, Clone)]
pub struct SessionBuildRecord {
    pub status: BuildStatus,
    pub error: Option<String>,
    pub build_time_seconds: Option<f64>,
    pub logs: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl Default for SessionBuildRecord {
    fn default() -> Self {
        Self {
            status: BuildStatus::Pending,
            error: None,
            build_time_seconds: None,
            logs: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl SessionBuildRecord {
    /// Append a log line, evicting the oldest once [`LOG_CAPACITY`] is hit.
    pub fn push_log(&mut self, line: impl Into<String>) {
        self.logs.push(line.into());
        if self.logs.len() > LOG_CAPACITY {
            let excess = self.logs.len() - LOG_CAPACITY;
            self.logs.drain(..excess);
        }
        self.updated_at = Utc::now();
    }

    /// The most recent [`LOG_TAIL_LEN`] log lines.
    pub fn log_tail(&self) -> Vec<String> {
        let start = self.logs.len().saturating_sub(LOG_TAIL_LEN);
        self.logs[start..].to_vec()
    }
}

/// Pollable view of a session's build state. `logs` is the bounded tail.
#[derive(Debug, Clone, Serialize)]
pub struct BuildStatusSnapshot {
    pub status: BuildStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_time_seconds: Option<f64>,
    pub logs: Vec<String>,
}
