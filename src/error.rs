// SPDX-License-Identifier: MIT
//! Build failure taxonomy.
//!
//! Every pipeline-level fault is caught at the top of the runner and turned
//! into a terminal `Error` status on the session record — a `BuildError`
//! never escapes the build task or takes the dispatcher down with it.

use thiserror::Error;

/// Maximum length of the externally reported error text. The full process
/// output is retained in the session log tail for diagnostics.
pub const ERROR_PREVIEW_MAX_CHARS: usize = 500;

#[derive(Debug, Error)]
pub enum BuildError {
    /// Unknown session / the project directory does not exist on disk.
    #[error("project not found for session {0}")]
    ProjectNotFound(String),

    /// An external build process exited nonzero. `preview` is truncated to
    /// [`ERROR_PREVIEW_MAX_CHARS`]; `full` carries the untruncated capture.
    #[error("{phase} failed: {preview}")]
    ProcessFailure {
        phase: &'static str,
        preview: String,
        full: String,
    },

    /// A phase exceeded its wall-clock budget. The child process is killed.
    #[error("{phase} timed out after {timeout_secs}s")]
    Timeout {
        phase: &'static str,
        timeout_secs: u64,
    },

    /// Anything else that went wrong inside the pipeline (spawn failure,
    /// I/O error, ...).
    #[error("build error: {0}")]
    Internal(String),
}

impl BuildError {
    /// The message stored on the session record and sent to subscribers.
    pub fn preview(&self) -> String {
        truncate_chars(&self.to_string(), ERROR_PREVIEW_MAX_CHARS)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<std::io::Error> for BuildError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

/// Truncate on a char boundary — process output is arbitrary UTF-8.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
