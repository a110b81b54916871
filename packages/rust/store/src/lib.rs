//! Filesystem artifact store.
//!
//! Owns the on-disk layout for published build outputs
//! (`{root}/static/{project}/{branch}/{revision}/...`) and the publish
//! primitives: directory creation with explicit conflict rejection, glob
//! selection of dist files, recursive permission-preserving copy, and the
//! atomic per-branch `@latest` marker swap.

mod paths;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use bundleworks_shared::{BundleworksError, Result};

pub use paths::{LATEST_MARKER, Layout, STATIC_SUBDIR};

/// One file copied into the published tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedFile {
    /// Path relative to the build working directory.
    pub path: String,
    /// Public URL the copy is reachable at.
    pub web_path: String,
}

/// Handle on the artifact storage root.
pub struct ArtifactStore {
    layout: Layout,
}

impl ArtifactStore {
    /// Open the store over an existing storage root.
    ///
    /// The root itself must already exist with correct access rights; the
    /// `static/` subtree is created on first use.
    pub fn new(storage_path: &Path, http_base_url: &str) -> Result<Self> {
        if !storage_path.is_dir() {
            return Err(BundleworksError::config(format!(
                "storage directory was not found ({}), create it first with correct access rights",
                storage_path.display()
            )));
        }

        let layout = Layout::new(storage_path, http_base_url);

        let static_path = layout.static_path();
        if !static_path.is_dir() {
            fs::create_dir(&static_path).map_err(|e| BundleworksError::io(&static_path, e))?;
        }

        Ok(Self { layout })
    }

    /// Path/URL computation for this store's root and base URL.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    // -----------------------------------------------------------------------
    // Directory primitives
    // -----------------------------------------------------------------------

    pub fn has_project_dir(&self, project_id: &str) -> bool {
        self.layout.project_path(project_id).is_dir()
    }

    pub fn create_project_dir(&self, project_id: &str) -> Result<()> {
        create_dir(&self.layout.project_path(project_id))
    }

    pub fn has_branch_dir(&self, project_id: &str, branch: &str) -> bool {
        self.layout.branch_path(project_id, branch).is_dir()
    }

    pub fn create_branch_dir(&self, project_id: &str, branch: &str) -> Result<()> {
        create_dir(&self.layout.branch_path(project_id, branch))
    }

    pub fn has_revision_dir(&self, project_id: &str, branch: &str, revision: &str) -> bool {
        self.layout
            .revision_path(project_id, branch, revision)
            .is_dir()
    }

    pub fn create_revision_dir(&self, project_id: &str, branch: &str, revision: &str) -> Result<()> {
        create_dir(&self.layout.revision_path(project_id, branch, revision))
    }

    /// Create the project, branch, and revision directories, treating
    /// already-present as success at every level.
    pub fn ensure_revision_dirs(
        &self,
        project_id: &str,
        branch: &str,
        revision: &str,
    ) -> Result<()> {
        for dir in [
            self.layout.project_path(project_id),
            self.layout.branch_path(project_id, branch),
            self.layout.revision_path(project_id, branch, revision),
        ] {
            if let Err(e) = create_dir(&dir) {
                if !e.is_conflict() {
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Temporary build directories
    // -----------------------------------------------------------------------

    pub fn tmp_build_path(&self, project_id: &str, branch: &str, revision: &str) -> PathBuf {
        self.layout.tmp_build_path(project_id, branch, revision)
    }

    pub fn has_tmp_dir(&self, project_id: &str, branch: &str, revision: &str) -> bool {
        self.tmp_build_path(project_id, branch, revision).exists()
    }

    /// Remove the attempt's working directory. Missing is not an error, so
    /// the cleanup path can run unconditionally.
    pub fn remove_tmp_dir(&self, project_id: &str, branch: &str, revision: &str) -> Result<()> {
        let path = self.tmp_build_path(project_id, branch, revision);
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(BundleworksError::io(&path, e)),
        }
    }

    // -----------------------------------------------------------------------
    // Publishing
    // -----------------------------------------------------------------------

    /// Expand `patterns` against `root` and return the matches.
    pub fn expand_globs(&self, root: &Path, patterns: &[String]) -> Result<Vec<PathBuf>> {
        let mut matches = Vec::new();

        for pattern in patterns {
            let full = root.join(pattern);
            let full = full.to_string_lossy();

            let paths = glob::glob(&full).map_err(|e| {
                BundleworksError::validation(format!("invalid dist glob {pattern}: {e}"))
            })?;

            for entry in paths {
                matches.push(entry.map_err(|e| BundleworksError::io(e.path().to_path_buf(), e.into_error()))?);
            }
        }

        Ok(matches)
    }

    /// Copy everything the dist globs select out of `tmp_path` into the
    /// revision's published directory, preserving relative structure, and
    /// return the (relative path, web path) record for every copied file.
    ///
    /// Directory matches are copied recursively and contribute one record
    /// per contained file. Overlapping globs are deduplicated by relative
    /// path.
    pub fn publish_dist_files(
        &self,
        project_id: &str,
        branch: &str,
        revision: &str,
        dist_patterns: &[String],
        tmp_path: &Path,
    ) -> Result<Vec<PublishedFile>> {
        let revision_path = self.layout.revision_path(project_id, branch, revision);
        let mut published: BTreeMap<String, PublishedFile> = BTreeMap::new();

        for matched in self.expand_globs(tmp_path, dist_patterns)? {
            let rel = matched.strip_prefix(tmp_path).map_err(|_| {
                BundleworksError::validation(format!(
                    "glob match {} escapes the working directory",
                    matched.display()
                ))
            })?;

            if matched.is_dir() {
                for file_rel in copy_dir_recursive(&matched, &revision_path.join(rel))? {
                    let rel_path = rel.join(file_rel).to_string_lossy().into_owned();
                    self.record_published(&mut published, project_id, branch, revision, rel_path);
                }
            } else {
                let dest = revision_path.join(rel);
                copy_file(&matched, &dest)?;
                let rel_path = rel.to_string_lossy().into_owned();
                self.record_published(&mut published, project_id, branch, revision, rel_path);
            }
        }

        Ok(published.into_values().collect())
    }

    fn record_published(
        &self,
        published: &mut BTreeMap<String, PublishedFile>,
        project_id: &str,
        branch: &str,
        revision: &str,
        rel_path: String,
    ) {
        let web_path = self.layout.web_path(project_id, branch, revision, &rel_path);
        published.insert(
            rel_path.clone(),
            PublishedFile {
                path: rel_path,
                web_path,
            },
        );
    }

    /// Swap the branch's `@latest` marker to this revision's directory.
    ///
    /// The symlink is created under a unique staging name and renamed over
    /// the marker, so readers never observe a missing or half-written link.
    pub fn set_latest(&self, project_id: &str, branch: &str, revision: &str) -> Result<()> {
        let revision_path = self.layout.revision_path(project_id, branch, revision);
        let target = fs::canonicalize(&revision_path)
            .map_err(|e| BundleworksError::io(&revision_path, e))?;

        let branch_path = self.layout.branch_path(project_id, branch);
        let staging = branch_path.join(format!(".latest-{}", Uuid::now_v7()));
        let marker = self.layout.latest_path(project_id, branch);

        std::os::unix::fs::symlink(&target, &staging)
            .map_err(|e| BundleworksError::io(&staging, e))?;

        if let Err(e) = fs::rename(&staging, &marker) {
            // Leave no stray staging link behind on failure.
            if let Err(unlink_err) = fs::remove_file(&staging) {
                warn!(path = %staging.display(), error = %unlink_err, "failed to remove staging link");
            }
            return Err(BundleworksError::io(&marker, e));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Copy primitives
// ---------------------------------------------------------------------------

/// Create a directory, rejecting an already-present target with a typed
/// conflict. The OS-level create is the existence check, so there is no
/// stat-then-mkdir window.
fn create_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(
            BundleworksError::conflict(format!("directory already exists: {}", path.display())),
        ),
        Err(e) => Err(BundleworksError::io(path, e)),
    }
}

/// Copy one file, creating parent directories as needed. `fs::copy`
/// carries the permission bits over.
fn copy_file(source: &Path, dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| BundleworksError::io(parent, e))?;
    }
    fs::copy(source, dest).map_err(|e| BundleworksError::io(dest, e))?;
    Ok(())
}

/// Copy a directory tree and return the relative paths of the copied files.
fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    let mut copied = Vec::new();

    for entry in walkdir::WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| {
            BundleworksError::io(
                e.path().map(Path::to_path_buf).unwrap_or_default(),
                e.into(),
            )
        })?;

        let rel = entry
            .path()
            .strip_prefix(source)
            .expect("walkdir yields children of its root")
            .to_path_buf();

        if entry.file_type().is_dir() {
            let dir = dest.join(&rel);
            fs::create_dir_all(&dir).map_err(|e| BundleworksError::io(&dir, e))?;
        } else {
            copy_file(entry.path(), &dest.join(&rel))?;
            copied.push(rel);
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a throwaway storage root.
    fn test_store() -> (PathBuf, ArtifactStore) {
        let root = std::env::temp_dir().join(format!("bw_store_{}", Uuid::now_v7()));
        fs::create_dir_all(&root).expect("create root");
        let store = ArtifactStore::new(&root, "http://localhost:3433").expect("open store");
        (root, store)
    }

    fn write_file(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn missing_root_is_startup_error() {
        let missing = std::env::temp_dir().join(format!("bw_missing_{}", Uuid::now_v7()));
        let result = ArtifactStore::new(&missing, "http://localhost:3433");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("was not found"));
    }

    #[test]
    fn create_dir_rejects_existing() {
        let (_root, store) = test_store();

        store.create_project_dir("42").expect("first create");
        let second = store.create_project_dir("42");
        assert!(second.is_err());
        assert!(second.unwrap_err().is_conflict());
        assert!(store.has_project_dir("42"));
    }

    #[test]
    fn ensure_revision_dirs_is_idempotent() {
        let (_root, store) = test_store();

        store.ensure_revision_dirs("42", "main", "abc123").expect("first");
        store.ensure_revision_dirs("42", "main", "abc123").expect("second");
        assert!(store.has_revision_dir("42", "main", "abc123"));
    }

    #[test]
    fn tmp_dir_roundtrip() {
        let (_root, store) = test_store();

        let tmp = store.tmp_build_path("42", "main", "abc123");
        assert!(!store.has_tmp_dir("42", "main", "abc123"));

        fs::create_dir_all(tmp.join("dist")).unwrap();
        assert!(store.has_tmp_dir("42", "main", "abc123"));

        store.remove_tmp_dir("42", "main", "abc123").expect("remove");
        assert!(!store.has_tmp_dir("42", "main", "abc123"));

        // Removing an absent dir is not an error.
        store.remove_tmp_dir("42", "main", "abc123").expect("remove again");
    }

    #[test]
    fn publish_selects_by_glob_and_preserves_structure() {
        let (_root, store) = test_store();
        store.ensure_revision_dirs("42", "main", "abc123").unwrap();

        let tmp = store.tmp_build_path("42", "main", "abc123");
        write_file(&tmp.join("dist/app.js"), "console.log(1)");
        write_file(&tmp.join("dist/css/app.css"), "body{}");
        write_file(&tmp.join("README.md"), "not published");

        let published = store
            .publish_dist_files("42", "main", "abc123", &["dist/**".into()], &tmp)
            .expect("publish");

        let paths: Vec<&str> = published.iter().map(|f| f.path.as_str()).collect();
        assert!(paths.contains(&"dist/app.js"));
        assert!(paths.contains(&"dist/css/app.css"));
        assert!(!paths.iter().any(|p| p.contains("README")));

        let revision_path = store.layout().revision_path("42", "main", "abc123");
        assert!(revision_path.join("dist/app.js").is_file());
        assert!(revision_path.join("dist/css/app.css").is_file());

        let app_js = published.iter().find(|f| f.path == "dist/app.js").unwrap();
        assert_eq!(
            app_js.web_path,
            "http://localhost:3433/static/42/main/abc123/dist/app.js"
        );
    }

    #[test]
    fn publish_deduplicates_overlapping_globs() {
        let (_root, store) = test_store();
        store.ensure_revision_dirs("42", "main", "abc123").unwrap();

        let tmp = store.tmp_build_path("42", "main", "abc123");
        write_file(&tmp.join("dist/app.js"), "console.log(1)");

        let published = store
            .publish_dist_files(
                "42",
                "main",
                "abc123",
                &["dist/**".into(), "dist/app.js".into()],
                &tmp,
            )
            .expect("publish");

        assert_eq!(
            published
                .iter()
                .filter(|f| f.path == "dist/app.js")
                .count(),
            1
        );
    }

    #[test]
    fn latest_marker_follows_most_recent_publish() {
        let (_root, store) = test_store();

        for revision in ["abc123", "def456"] {
            store.ensure_revision_dirs("42", "main", revision).unwrap();
            store.set_latest("42", "main", revision).expect("set latest");
        }

        let marker = store.layout().latest_path("42", "main");
        let target = fs::read_link(&marker).expect("marker is a symlink");
        assert!(target.ends_with("def456"), "marker points at {target:?}");

        // No staging leftovers next to the marker.
        let stray: Vec<_> = fs::read_dir(store.layout().branch_path("42", "main"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".latest-"))
            .collect();
        assert!(stray.is_empty());
    }
}
