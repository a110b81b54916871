//! Core domain types for the build ledger: branches, revisions, builds, files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// BuildStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a build attempt.
///
/// A build is created `InProgress`, moves to `Ready` together with its file
/// list in one transaction, or to `Failed` when any step of the attempt
/// errors out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    InProgress,
    Ready,
    Failed,
}

impl BuildStatus {
    /// Stable string form used as the database column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown build status: {other}")),
        }
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Ledger rows
// ---------------------------------------------------------------------------

/// A tracked branch of a source project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    /// Unique branch row identifier (UUID v7).
    pub id: String,
    /// Owning project identifier from configuration.
    pub project_id: String,
    /// Branch name as known to source control.
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One immutable commit of a branch, the unit a build is made from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    /// Unique revision row identifier (UUID v7).
    pub id: String,
    /// Owning branch row.
    pub branch_id: String,
    /// Commit short id. Unique within a branch.
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// One artifact-producing attempt for a revision.
///
/// At most one build exists per revision; this is what makes "build this
/// revision" idempotent at the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    /// Unique build row identifier (UUID v7).
    pub id: String,
    /// Owning revision row.
    pub revision_id: String,
    pub status: BuildStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Published files; populated once the build reaches `Ready`.
    #[serde(default)]
    pub files: Vec<BuildFile>,
}

/// A single published artifact file of a ready build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildFile {
    pub id: String,
    pub build_id: String,
    /// Path relative to the cloned working directory.
    pub path: String,
    /// Public web-accessible URL of the published copy.
    pub web_path: String,
}

// ---------------------------------------------------------------------------
// List query shapes
// ---------------------------------------------------------------------------

/// A branch row together with its revision count, for listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchSummary {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub revision_count: u64,
}

/// A revision row together with its build count, for listing endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionSummary {
    pub id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub build_count: u64,
}

/// Limit/offset pair accepted by all list queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: u32,
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 20,
            offset: 0,
        }
    }
}

/// One page of a list query, with the total count across all pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub limit: u32,
    pub offset: u32,
}

impl<T> Page<T> {
    /// Assemble a page from items, total, and the pagination that produced it.
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        Self {
            items,
            total,
            limit: pagination.limit,
            offset: pagination.offset,
        }
    }
}
