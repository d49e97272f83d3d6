// SPDX-License-Identifier: MIT
//! Per-session project tree access.
//!
//! Each session owns one directory under the projects root:
//!
//!   {projects_dir}/{session}/src/**        — editable sources (watched)
//!   {projects_dir}/{session}/dist/**       — build output
//!   {projects_dir}/{session}/package.json  — build manifest (opaque here)
//!
//! The AI edit loop talks to this module through `save_files`; everything
//! else in the daemon only needs the path resolvers.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Subdirectory holding a session's editable sources.
pub const SRC_DIR: &str = "src";
/// Subdirectory produced by the build phase.
pub const DIST_DIR: &str = "dist";

/// Resolves and manipulates session project trees on the local filesystem.
pub struct ProjectStore {
    projects_dir: PathBuf,
}

impl ProjectStore {
    pub fn new(projects_dir: impl Into<PathBuf>) -> Self {
        Self {
            projects_dir: projects_dir.into(),
        }
    }

    /// Root directory for a session's project.
    pub fn project_path(&self, session_id: &str) -> PathBuf {
        self.projects_dir.join(session_id)
    }

    pub fn src_path(&self, session_id: &str) -> PathBuf {
        self.project_path(session_id).join(SRC_DIR)
    }

    pub fn dist_path(&self, session_id: &str) -> PathBuf {
        self.project_path(session_id).join(DIST_DIR)
    }

    pub fn exists(&self, session_id: &str) -> bool {
        self.project_path(session_id).is_dir()
    }

    /// Write a map of `relative path under src/` → file content. Parent
    /// directories are created as needed. This is the "save" call the edit
    /// loop invokes after generating code.
    pub async fn save_files(
        &self,
        session_id: &str,
        files: &BTreeMap<String, String>,
    ) -> Result<()> {
        let src = self.src_path(session_id);
        tokio::fs::create_dir_all(&src).await?;

        for (rel, content) in files {
            let dest = src.join(rel);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&dest, content).await?;
        }
        Ok(())
    }

    /// Read every file under `src/` back as `relative path` → content.
    /// Missing project or src directory yields an empty map.
    pub async fn load_files(&self, session_id: &str) -> Result<BTreeMap<String, String>> {
        let src = self.src_path(session_id);
        let mut files = BTreeMap::new();
        if !src.is_dir() {
            return Ok(files);
        }
        collect_files(&src, &src, &mut files)?;
        Ok(files)
    }

    /// Remove a session's entire project tree.
    pub async fn delete_project(&self, session_id: &str) -> Result<()> {
        let path = self.project_path(session_id);
        if path.exists() {
            tokio::fs::remove_dir_all(&path).await?;
            info!(session_id, "project deleted");
        }
        Ok(())
    }
}

fn collect_files(
    base: &Path,
    dir: &Path,
    out: &mut BTreeMap<String, String>,
) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else if let Ok(rel) = path.strip_prefix(base) {
            let content = std::fs::read_to_string(&path)?;
            out.insert(rel.to_string_lossy().into_owned(), content);
        }
    }
    Ok(())
}
