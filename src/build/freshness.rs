//! Mtime-based freshness check.
//!
//! A build output is "current" when the built marker exists and no file
//! under `src/` is newer than the `dist/` directory. This is a timestamp
//! heuristic, not a content hash: a copied tree or a clock jump can
//! produce identical timestamps and a wrong answer in either direction.
//! That limitation is accepted — the worst case is one redundant rebuild
//! or one stale preview until the next edit.

use std::path::Path;
use std::time::SystemTime;

use crate::project::{DIST_DIR, SRC_DIR};

/// Marker file whose presence means "a build output exists".
pub const BUILT_MARKER: &str = "index.html";

/// True when `dist/index.html` exists for the project.
pub fn is_built(project_path: &Path) -> bool {
    project_path.join(DIST_DIR).join(BUILT_MARKER).is_file()
}

/// True when the existing output may be served instead of rebuilding:
/// the marker exists and every file under `src/` has mtime ≤ the `dist/`
/// directory's mtime. A missing `src/` tree counts as current.
pub fn output_is_current(project_path: &Path) -> bool {
    if !is_built(project_path) {
        return false;
    }

    let dist_mtime = match mtime(&project_path.join(DIST_DIR)) {
        Some(t) => t,
        None => return false,
    };

    let src = project_path.join(SRC_DIR);
    if !src.is_dir() {
        return true;
    }
    !any_file_newer_than(&src, dist_mtime)
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn any_file_newer_than(dir: &Path, threshold: SystemTime) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(_) => return false,
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            if any_file_newer_than(&path, threshold) {
                return true;
            }
        } else if let Some(t) = mtime(&path) {
            if t > threshold {
                return true;
            }
        }
    }
    false
}
