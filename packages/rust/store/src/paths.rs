//! Pure path and URL computation for the artifact store.
//!
//! Everything here is deterministic over its inputs and never touches the
//! filesystem, so the layout contract can be tested without one.

use std::path::{Path, PathBuf};

/// Subdirectory of the storage root holding the published artifact tree.
pub const STATIC_SUBDIR: &str = "static";

/// Name of the per-branch marker pointing at the latest published revision.
pub const LATEST_MARKER: &str = "@latest";

/// Computes on-disk locations and public URLs for the artifact tree:
/// `{root}/static/{project}/{branch}/{revision}/{rel_path}`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
    http_base_url: String,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, http_base_url: impl Into<String>) -> Self {
        let mut http_base_url = http_base_url.into();
        while http_base_url.ends_with('/') {
            http_base_url.pop();
        }
        Self {
            root: root.into(),
            http_base_url,
        }
    }

    /// Storage root the store was opened on.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the published artifact tree.
    pub fn static_path(&self) -> PathBuf {
        self.root.join(STATIC_SUBDIR)
    }

    pub fn project_path(&self, project_id: &str) -> PathBuf {
        self.static_path().join(project_id)
    }

    pub fn branch_path(&self, project_id: &str, branch: &str) -> PathBuf {
        self.project_path(project_id).join(branch)
    }

    pub fn revision_path(&self, project_id: &str, branch: &str, revision: &str) -> PathBuf {
        self.branch_path(project_id, branch).join(revision)
    }

    /// The branch's latest-revision marker.
    pub fn latest_path(&self, project_id: &str, branch: &str) -> PathBuf {
        self.branch_path(project_id, branch).join(LATEST_MARKER)
    }

    /// Private working directory for one build attempt, outside the
    /// published tree.
    pub fn tmp_build_path(&self, project_id: &str, branch: &str, revision: &str) -> PathBuf {
        self.root.join(format!("{project_id}-{branch}-{revision}"))
    }

    /// Public URL a published file is reachable at.
    pub fn web_path(
        &self,
        project_id: &str,
        branch: &str,
        revision: &str,
        rel_path: &str,
    ) -> String {
        format!(
            "{}/{STATIC_SUBDIR}/{project_id}/{branch}/{revision}/{rel_path}",
            self.http_base_url
        )
    }
}
