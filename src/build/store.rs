// SPDX-License-Identifier: MIT
//! Session-keyed build state store.
//!
//! One internally synchronized table instead of parallel status/error/log
//! maps. Records are created on first use and live for the process
//! lifetime unless the session's project is deleted (`forget`).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;

use super::model::{BuildStatus, BuildStatusSnapshot, SessionBuildRecord};

pub struct BuildStateStore {
    records: RwLock<HashMap<String, SessionBuildRecord>>,
}

impl BuildStateStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Current status, `Pending` for a session never built.
    pub fn status(&self, session_id: &str) -> BuildStatus {
        self.records
            .read()
            .expect("build state store poisoned")
            .get(session_id)
            .map(|r| r.status)
            .unwrap_or(BuildStatus::Pending)
    }

    /// Mark a session queued: status Pending, previous logs cleared.
    pub fn mark_pending(&self, session_id: &str) {
        let mut records = self.records.write().expect("build state store poisoned");
        let record = records.entry(session_id.to_string()).or_default();
        record.status = BuildStatus::Pending;
        record.error = None;
        record.logs.clear();
        record.updated_at = Utc::now();
    }

    /// Atomic Idle→Building transition, performed at job start.
    ///
    /// Returns `false` when the session is already Building — the caller
    /// drops the job as a coalesced duplicate. The check and the
    /// transition happen under one write lock, so two dispatched jobs for
    /// the same session can never both enter the pipeline.
    pub fn try_begin(&self, session_id: &str) -> bool {
        let mut records = self.records.write().expect("build state store poisoned");
        let record = records.entry(session_id.to_string()).or_default();
        if record.status == BuildStatus::Building {
            return false;
        }
        record.status = BuildStatus::Building;
        record.updated_at = Utc::now();
        true
    }

    /// Append a log line; returns the bounded tail for the progress event.
    pub fn append_log(&self, session_id: &str, line: impl Into<String>) -> Vec<String> {
        let mut records = self.records.write().expect("build state store poisoned");
        let record = records.entry(session_id.to_string()).or_default();
        record.push_log(line);
        record.log_tail()
    }

    /// Terminal success: record the wall-clock duration.
    pub fn complete(&self, session_id: &str, build_time_seconds: f64) {
        let mut records = self.records.write().expect("build state store poisoned");
        let record = records.entry(session_id.to_string()).or_default();
        record.status = BuildStatus::Success;
        record.error = None;
        record.build_time_seconds = Some(build_time_seconds);
        record.updated_at = Utc::now();
    }

    /// Terminal failure: store the (already truncated) error text.
    pub fn fail(&self, session_id: &str, error: impl Into<String>) {
        let mut records = self.records.write().expect("build state store poisoned");
        let record = records.entry(session_id.to_string()).or_default();
        record.status = BuildStatus::Error;
        record.error = Some(error.into());
        record.updated_at = Utc::now();
    }

    /// Pollable snapshot: status, error, duration, bounded log tail.
    /// A session never seen yields the Pending default.
    pub fn snapshot(&self, session_id: &str) -> BuildStatusSnapshot {
        let records = self.records.read().expect("build state store poisoned");
        match records.get(session_id) {
            Some(r) => BuildStatusSnapshot {
                status: r.status,
                error: r.error.clone(),
                build_time_seconds: r.build_time_seconds,
                logs: r.log_tail(),
            },
            None => BuildStatusSnapshot {
                status: BuildStatus::Pending,
                error: None,
                build_time_seconds: None,
                logs: Vec::new(),
            },
        }
    }

    /// Full retained log (≤ capacity), oldest first.
    pub fn logs(&self, session_id: &str) -> Vec<String> {
        self.records
            .read()
            .expect("build state store poisoned")
            .get(session_id)
            .map(|r| r.logs.clone())
            .unwrap_or_default()
    }

    /// Drop a session's record entirely (project deleted externally).
    pub fn forget(&self, session_id: &str) {
        self.records
            .write()
            .expect("build state store poisoned")
            .remove(session_id);
    }
}

impl Default for BuildStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_begin_is_exclusive_while_building() {
        let store = BuildStateStore::new();
        store.mark_pending("abc");
        assert!(store.try_begin("abc"));
        assert_eq!(store.status("abc"), BuildStatus::Building);
        // Second job for the same session is rejected until terminal.
        assert!(!store.try_begin("abc"));

        store.complete("abc", 1.5);
        assert_eq!(store.status("abc"), BuildStatus::Success);
        // A fresh attempt may begin again after a terminal state.
        assert!(store.try_begin("abc"));
    }

    #[test]
    fn mark_pending_clears_previous_attempt_logs() {
        let store = BuildStateStore::new();
        store.append_log("abc", "old line");
        store.fail("abc", "boom");
        store.mark_pending("abc");

        let snap = store.snapshot("abc");
        assert_eq!(snap.status, BuildStatus::Pending);
        assert!(snap.logs.is_empty());
        assert!(snap.error.is_none());
    }

    #[test]
    fn snapshot_of_unknown_session_is_pending() {
        let store = BuildStateStore::new();
        let snap = store.snapshot("never-seen");
        assert_eq!(snap.status, BuildStatus::Pending);
        assert!(snap.logs.is_empty());
    }

    #[test]
    fn complete_records_duration_and_clears_error() {
        let store = BuildStateStore::new();
        store.fail("abc", "first attempt failed");
        store.complete("abc", 12.34);
        let snap = store.snapshot("abc");
        assert_eq!(snap.status, BuildStatus::Success);
        assert_eq!(snap.build_time_seconds, Some(12.34));
        assert!(snap.error.is_none());
    }

    #[test]
    fn forget_removes_record() {
        let store = BuildStateStore::new();
        store.fail("abc", "x");
        store.forget("abc");
        assert_eq!(store.snapshot("abc").status, BuildStatus::Pending);
        assert!(store.logs("abc").is_empty());
    }
}
