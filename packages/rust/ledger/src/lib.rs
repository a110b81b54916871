//! libSQL build ledger.
//!
//! The [`Ledger`] struct wraps a libSQL database recording branches,
//! revisions, builds, and published build files, and serves the paginated
//! list queries behind the HTTP listing endpoints.
//!
//! **Idempotency invariants** (enforced by uniqueness constraints):
//! - one branch row per `(project_id, name)`
//! - one revision row per `(branch_id, name)` — a duplicate insert is the
//!   "revision unchanged" rejection
//! - one build row per revision

mod migrations;

use std::path::Path;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use bundleworks_shared::{
    Branch, BranchSummary, Build, BuildFile, BuildStatus, BundleworksError, Page, Pagination,
    Result, Revision, RevisionSummary,
};
use libsql::{Connection, Database, params};

/// Primary ledger handle wrapping a libSQL database.
pub struct Ledger {
    db: Database,
    conn: Connection,
}

impl Ledger {
    /// Open or create a ledger database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| BundleworksError::io(parent, e))?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        configure_connection(&conn).await?;

        let ledger = Self { db, conn };
        ledger.run_migrations().await?;
        Ok(ledger)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    BundleworksError::Storage(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Branch operations
    // -----------------------------------------------------------------------

    /// Get a branch row by project and name.
    pub async fn get_branch(&self, project_id: &str, name: &str) -> Result<Option<Branch>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, project_id, name, created_at, updated_at
                 FROM branches WHERE project_id = ?1 AND name = ?2",
                params![project_id, name],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_branch(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(BundleworksError::Storage(e.to_string())),
        }
    }

    /// Get the branch row for `(project_id, name)`, creating it lazily on
    /// first use. Branches are never deleted by the pipeline.
    pub async fn get_or_create_branch(&self, project_id: &str, name: &str) -> Result<Branch> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO branches (id, project_id, name, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(project_id, name) DO NOTHING",
                params![
                    Uuid::now_v7().to_string(),
                    project_id,
                    name,
                    now.as_str(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        self.get_branch(project_id, name).await?.ok_or_else(|| {
            BundleworksError::Storage(format!("branch {project_id}/{name} vanished after insert"))
        })
    }

    /// Bump a branch's `updated_at` timestamp (touched on every new revision).
    pub async fn touch_branch(&self, branch_id: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE branches SET updated_at = ?1 WHERE id = ?2",
                params![now.as_str(), branch_id],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete a branch row; revisions, builds, and files cascade.
    pub async fn delete_branch(&self, branch_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM branches WHERE id = ?1", params![branch_id])
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Revision operations
    // -----------------------------------------------------------------------

    /// Record a new revision of a branch.
    ///
    /// Returns a conflict error when the revision is already recorded — the
    /// insert itself is the duplicate-build check, so a concurrent request
    /// for the same commit cannot slip past between check and create.
    pub async fn create_revision(&self, branch_id: &str, name: &str) -> Result<Revision> {
        let revision = Revision {
            id: Uuid::now_v7().to_string(),
            branch_id: branch_id.to_string(),
            name: name.to_string(),
            created_at: Utc::now(),
        };

        self.conn
            .execute(
                "INSERT INTO revisions (id, branch_id, name, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    revision.id.as_str(),
                    revision.branch_id.as_str(),
                    revision.name.as_str(),
                    revision.created_at.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| map_unique_violation(e, format!("revision {name} already recorded")))?;

        Ok(revision)
    }

    /// Whether a revision is already recorded under `(project_id, branch)`.
    pub async fn revision_exists(
        &self,
        project_id: &str,
        branch: &str,
        revision: &str,
    ) -> Result<bool> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM revisions r
                 JOIN branches b ON b.id = r.branch_id
                 WHERE b.project_id = ?1 AND b.name = ?2 AND r.name = ?3",
                params![project_id, branch, revision],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row
                    .get(0)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?;
                Ok(count > 0)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(BundleworksError::Storage(e.to_string())),
        }
    }

    /// Delete a revision row; its build and files cascade.
    pub async fn delete_revision(&self, revision_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM revisions WHERE id = ?1", params![revision_id])
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Build operations
    // -----------------------------------------------------------------------

    /// Create the build row for a revision in state `InProgress`.
    ///
    /// The `UNIQUE(revision_id)` constraint rejects a second attempt for the
    /// same revision.
    pub async fn create_build(&self, revision_id: &str) -> Result<Build> {
        let now = Utc::now();
        let build = Build {
            id: Uuid::now_v7().to_string(),
            revision_id: revision_id.to_string(),
            status: BuildStatus::InProgress,
            created_at: now,
            updated_at: now,
            files: Vec::new(),
        };

        self.conn
            .execute(
                "INSERT INTO builds (id, revision_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    build.id.as_str(),
                    build.revision_id.as_str(),
                    build.status.as_str(),
                    now.to_rfc3339(),
                    now.to_rfc3339()
                ],
            )
            .await
            .map_err(|e| {
                map_unique_violation(e, format!("revision {revision_id} already has a build"))
            })?;

        Ok(build)
    }

    /// Transition a build to `Ready` and record its published files.
    ///
    /// Status and file list are written in one transaction, so readers see
    /// either an in-progress build with no files or a ready build with the
    /// complete batch — never a partial list.
    pub async fn finish_build(&self, build_id: &str, files: &[(String, String)]) -> Result<()> {
        // A dedicated connection keeps this transaction isolated from writes
        // issued by other build attempts finishing in the same batch.
        let conn = self
            .db
            .connect()
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;
        configure_connection(&conn).await?;

        conn.execute("BEGIN IMMEDIATE", params![])
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        let result = finish_build_inner(&conn, build_id, files).await;

        match result {
            Ok(()) => conn
                .execute("COMMIT", params![])
                .await
                .map(|_| ())
                .map_err(|e| BundleworksError::Storage(e.to_string())),
            Err(e) => {
                if let Err(rollback_err) = conn.execute("ROLLBACK", params![]).await {
                    tracing::error!(error = %rollback_err, "rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Mark a build as failed after an errored attempt.
    pub async fn mark_build_failed(&self, build_id: &str) -> Result<()> {
        self.set_build_status(build_id, BuildStatus::Failed).await
    }

    async fn set_build_status(&self, build_id: &str, status: BuildStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE builds SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), now.as_str(), build_id],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Get the build for a revision, files included, if one exists.
    pub async fn get_build_for_revision(&self, revision_id: &str) -> Result<Option<Build>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, revision_id, status, created_at, updated_at
                 FROM builds WHERE revision_id = ?1",
                params![revision_id],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let mut build = row_to_build(&row)?;
                build.files = self.get_build_files(&build.id).await?;
                Ok(Some(build))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(BundleworksError::Storage(e.to_string())),
        }
    }

    /// Delete a build row; its files cascade.
    pub async fn delete_build(&self, build_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM builds WHERE id = ?1", params![build_id])
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_build_files(&self, build_id: &str) -> Result<Vec<BuildFile>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, build_id, path, web_path
                 FROM build_files WHERE build_id = ?1 ORDER BY path",
                params![build_id],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        let mut files = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            files.push(BuildFile {
                id: row
                    .get::<String>(0)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
                build_id: row
                    .get::<String>(1)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
                path: row
                    .get::<String>(2)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
                web_path: row
                    .get::<String>(3)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
            });
        }
        Ok(files)
    }

    // -----------------------------------------------------------------------
    // List queries
    // -----------------------------------------------------------------------

    /// Paginated branches of a project, each with its revision count.
    pub async fn list_branches(
        &self,
        project_id: &str,
        pagination: Pagination,
    ) -> Result<Page<BranchSummary>> {
        let total = self
            .count(
                "SELECT COUNT(*) FROM branches WHERE project_id = ?1",
                params![project_id],
            )
            .await?;

        let mut rows = self
            .conn
            .query(
                "SELECT b.id, b.project_id, b.name, b.created_at, COUNT(r.id)
                 FROM branches b
                 LEFT JOIN revisions r ON r.branch_id = b.id
                 WHERE b.project_id = ?1
                 GROUP BY b.id
                 ORDER BY b.name
                 LIMIT ?2 OFFSET ?3",
                params![project_id, pagination.limit, pagination.offset],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            items.push(BranchSummary {
                id: row
                    .get::<String>(0)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
                project_id: row
                    .get::<String>(1)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
                name: row
                    .get::<String>(2)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
                created_at: parse_timestamp(&row, 3)?,
                revision_count: row
                    .get::<i64>(4)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?
                    as u64,
            });
        }

        Ok(Page::new(items, total, pagination))
    }

    /// Paginated revisions of a branch, newest first, each with its build count.
    pub async fn list_revisions(
        &self,
        project_id: &str,
        branch: &str,
        pagination: Pagination,
    ) -> Result<Page<RevisionSummary>> {
        let total = self
            .count(
                "SELECT COUNT(*) FROM revisions r
                 JOIN branches b ON b.id = r.branch_id
                 WHERE b.project_id = ?1 AND b.name = ?2",
                params![project_id, branch],
            )
            .await?;

        let mut rows = self
            .conn
            .query(
                "SELECT r.id, r.name, r.created_at, COUNT(bl.id)
                 FROM revisions r
                 JOIN branches b ON b.id = r.branch_id
                 LEFT JOIN builds bl ON bl.revision_id = r.id
                 WHERE b.project_id = ?1 AND b.name = ?2
                 GROUP BY r.id
                 ORDER BY r.created_at DESC
                 LIMIT ?3 OFFSET ?4",
                params![project_id, branch, pagination.limit, pagination.offset],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            items.push(RevisionSummary {
                id: row
                    .get::<String>(0)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
                name: row
                    .get::<String>(1)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?,
                created_at: parse_timestamp(&row, 2)?,
                build_count: row
                    .get::<i64>(3)
                    .map_err(|e| BundleworksError::Storage(e.to_string()))?
                    as u64,
            });
        }

        Ok(Page::new(items, total, pagination))
    }

    /// Paginated builds of a `(branch, revision)` pair, files included.
    pub async fn list_builds(
        &self,
        project_id: &str,
        branch: &str,
        revision: &str,
        pagination: Pagination,
    ) -> Result<Page<Build>> {
        let total = self
            .count(
                "SELECT COUNT(*) FROM builds bl
                 JOIN revisions r ON r.id = bl.revision_id
                 JOIN branches b ON b.id = r.branch_id
                 WHERE b.project_id = ?1 AND b.name = ?2 AND r.name = ?3",
                params![project_id, branch, revision],
            )
            .await?;

        let mut rows = self
            .conn
            .query(
                "SELECT bl.id, bl.revision_id, bl.status, bl.created_at, bl.updated_at
                 FROM builds bl
                 JOIN revisions r ON r.id = bl.revision_id
                 JOIN branches b ON b.id = r.branch_id
                 WHERE b.project_id = ?1 AND b.name = ?2 AND r.name = ?3
                 ORDER BY bl.created_at
                 LIMIT ?4 OFFSET ?5",
                params![
                    project_id,
                    branch,
                    revision,
                    pagination.limit,
                    pagination.offset
                ],
            )
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        let mut items = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            items.push(row_to_build(&row)?);
        }

        for build in &mut items {
            build.files = self.get_build_files(&build.id).await?;
        }

        Ok(Page::new(items, total, pagination))
    }

    async fn count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| BundleworksError::Storage(e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => row
                .get::<i64>(0)
                .map(|n| n as u64)
                .map_err(|e| BundleworksError::Storage(e.to_string())),
            Ok(None) => Ok(0),
            Err(e) => Err(BundleworksError::Storage(e.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection helpers and row mapping
// ---------------------------------------------------------------------------

/// Per-connection pragmas: cascades ride on foreign keys, and concurrent
/// writers wait out each other's locks instead of failing immediately.
async fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", params![])
        .await
        .map_err(|e| BundleworksError::Storage(e.to_string()))?;
    conn.execute("PRAGMA busy_timeout = 5000", params![])
        .await
        .map_err(|e| BundleworksError::Storage(e.to_string()))?;
    Ok(())
}

async fn finish_build_inner(
    conn: &Connection,
    build_id: &str,
    files: &[(String, String)],
) -> Result<()> {
    for (path, web_path) in files {
        conn.execute(
            "INSERT INTO build_files (id, build_id, path, web_path)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                Uuid::now_v7().to_string(),
                build_id,
                path.as_str(),
                web_path.as_str()
            ],
        )
        .await
        .map_err(|e| BundleworksError::Storage(e.to_string()))?;
    }

    let now = Utc::now().to_rfc3339();
    conn.execute(
        "UPDATE builds SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![BuildStatus::Ready.as_str(), now.as_str(), build_id],
    )
    .await
    .map_err(|e| BundleworksError::Storage(e.to_string()))?;
    Ok(())
}

fn map_unique_violation(e: libsql::Error, conflict_message: String) -> BundleworksError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") {
        BundleworksError::conflict(conflict_message)
    } else {
        BundleworksError::Storage(msg)
    }
}

fn parse_timestamp(row: &libsql::Row, index: i32) -> Result<DateTime<Utc>> {
    let s: String = row
        .get(index)
        .map_err(|e| BundleworksError::Storage(e.to_string()))?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| BundleworksError::Storage(format!("invalid timestamp: {e}")))
}

fn row_to_branch(row: &libsql::Row) -> Result<Branch> {
    Ok(Branch {
        id: row
            .get::<String>(0)
            .map_err(|e| BundleworksError::Storage(e.to_string()))?,
        project_id: row
            .get::<String>(1)
            .map_err(|e| BundleworksError::Storage(e.to_string()))?,
        name: row
            .get::<String>(2)
            .map_err(|e| BundleworksError::Storage(e.to_string()))?,
        created_at: parse_timestamp(row, 3)?,
        updated_at: parse_timestamp(row, 4)?,
    })
}

fn row_to_build(row: &libsql::Row) -> Result<Build> {
    let status: String = row
        .get(2)
        .map_err(|e| BundleworksError::Storage(e.to_string()))?;

    Ok(Build {
        id: row
            .get::<String>(0)
            .map_err(|e| BundleworksError::Storage(e.to_string()))?,
        revision_id: row
            .get::<String>(1)
            .map_err(|e| BundleworksError::Storage(e.to_string()))?,
        status: status
            .parse()
            .map_err(|e: String| BundleworksError::Storage(e))?,
        created_at: parse_timestamp(row, 3)?,
        updated_at: parse_timestamp(row, 4)?,
        files: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Create a temp file ledger for testing.
    async fn test_ledger() -> Ledger {
        let tmp = std::env::temp_dir().join(format!("bw_test_{}.db", Uuid::now_v7()));
        Ledger::open(&tmp).await.expect("open test db")
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let ledger = test_ledger().await;
        assert_eq!(ledger.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("bw_test_{}.db", Uuid::now_v7()));
        let first = Ledger::open(&tmp).await.expect("first open");
        drop(first);
        let second = Ledger::open(&tmp).await.expect("second open");
        assert_eq!(second.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn branch_created_lazily_once() {
        let ledger = test_ledger().await;

        let first = ledger
            .get_or_create_branch("42", "main")
            .await
            .expect("create branch");
        let second = ledger
            .get_or_create_branch("42", "main")
            .await
            .expect("get branch");
        assert_eq!(first.id, second.id);

        // Same name under another project is a distinct row.
        let other = ledger
            .get_or_create_branch("43", "main")
            .await
            .expect("create other");
        assert_ne!(first.id, other.id);
    }

    #[tokio::test]
    async fn duplicate_revision_is_conflict() {
        let ledger = test_ledger().await;
        let branch = ledger.get_or_create_branch("42", "main").await.unwrap();

        ledger
            .create_revision(&branch.id, "abc123")
            .await
            .expect("first revision");

        let dup = ledger.create_revision(&branch.id, "abc123").await;
        assert!(dup.is_err());
        assert!(dup.unwrap_err().is_conflict());

        // A different commit on the same branch is fine.
        ledger
            .create_revision(&branch.id, "def456")
            .await
            .expect("second revision");
    }

    #[tokio::test]
    async fn revision_existence_check() {
        let ledger = test_ledger().await;
        let branch = ledger.get_or_create_branch("42", "main").await.unwrap();
        ledger.create_revision(&branch.id, "abc123").await.unwrap();

        assert!(ledger.revision_exists("42", "main", "abc123").await.unwrap());
        assert!(!ledger.revision_exists("42", "main", "zzz999").await.unwrap());
        assert!(!ledger.revision_exists("42", "develop", "abc123").await.unwrap());
    }

    #[tokio::test]
    async fn one_build_per_revision() {
        let ledger = test_ledger().await;
        let branch = ledger.get_or_create_branch("42", "main").await.unwrap();
        let revision = ledger.create_revision(&branch.id, "abc123").await.unwrap();

        let build = ledger.create_build(&revision.id).await.expect("build");
        assert_eq!(build.status, BuildStatus::InProgress);

        let dup = ledger.create_build(&revision.id).await;
        assert!(dup.is_err());
        assert!(dup.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn finish_build_writes_status_and_files_together() {
        let ledger = test_ledger().await;
        let branch = ledger.get_or_create_branch("42", "main").await.unwrap();
        let revision = ledger.create_revision(&branch.id, "abc123").await.unwrap();
        let build = ledger.create_build(&revision.id).await.unwrap();

        let in_progress = ledger
            .get_build_for_revision(&revision.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(in_progress.status, BuildStatus::InProgress);
        assert!(in_progress.files.is_empty());

        let files = vec![
            (
                "dist/app.js".to_string(),
                "http://localhost:3433/static/42/main/abc123/dist/app.js".to_string(),
            ),
            (
                "dist/app.css".to_string(),
                "http://localhost:3433/static/42/main/abc123/dist/app.css".to_string(),
            ),
        ];
        ledger.finish_build(&build.id, &files).await.expect("finish");

        let ready = ledger
            .get_build_for_revision(&revision.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ready.status, BuildStatus::Ready);
        assert_eq!(ready.files.len(), 2);
        assert_eq!(ready.files[0].path, "dist/app.css");
        assert!(ready.files[0].web_path.contains("/static/42/main/abc123/"));
    }

    #[tokio::test]
    async fn failed_build_keeps_empty_file_list() {
        let ledger = test_ledger().await;
        let branch = ledger.get_or_create_branch("42", "main").await.unwrap();
        let revision = ledger.create_revision(&branch.id, "abc123").await.unwrap();
        let build = ledger.create_build(&revision.id).await.unwrap();

        ledger.mark_build_failed(&build.id).await.expect("mark failed");

        let failed = ledger
            .get_build_for_revision(&revision.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(failed.status, BuildStatus::Failed);
        assert!(failed.files.is_empty());
    }

    #[tokio::test]
    async fn branch_delete_cascades() {
        let ledger = test_ledger().await;
        let branch = ledger.get_or_create_branch("42", "main").await.unwrap();
        let revision = ledger.create_revision(&branch.id, "abc123").await.unwrap();
        let build = ledger.create_build(&revision.id).await.unwrap();
        ledger
            .finish_build(&build.id, &[("dist/app.js".into(), "http://x/app.js".into())])
            .await
            .unwrap();

        ledger.delete_branch(&branch.id).await.expect("delete");

        assert!(!ledger.revision_exists("42", "main", "abc123").await.unwrap());
        assert!(ledger
            .get_build_for_revision(&revision.id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn branch_listing_counts_and_paginates() {
        let ledger = test_ledger().await;

        for name in ["develop", "main", "release"] {
            let branch = ledger.get_or_create_branch("42", name).await.unwrap();
            ledger.create_revision(&branch.id, "abc123").await.unwrap();
        }
        let main = ledger.get_or_create_branch("42", "main").await.unwrap();
        ledger.create_revision(&main.id, "def456").await.unwrap();

        let page = ledger
            .list_branches("42", Pagination { limit: 2, offset: 0 })
            .await
            .expect("list");
        assert_eq!(page.total, 3);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].name, "develop");
        assert_eq!(page.items[1].name, "main");
        assert_eq!(page.items[1].revision_count, 2);

        let rest = ledger
            .list_branches("42", Pagination { limit: 2, offset: 2 })
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.items[0].name, "release");
    }

    #[tokio::test]
    async fn revision_listing_counts_builds() {
        let ledger = test_ledger().await;
        let branch = ledger.get_or_create_branch("42", "main").await.unwrap();

        let first = ledger.create_revision(&branch.id, "abc123").await.unwrap();
        ledger.create_build(&first.id).await.unwrap();
        ledger.create_revision(&branch.id, "def456").await.unwrap();

        let page = ledger
            .list_revisions("42", "main", Pagination::default())
            .await
            .expect("list");
        assert_eq!(page.total, 2);

        let built = page.items.iter().find(|r| r.name == "abc123").unwrap();
        assert_eq!(built.build_count, 1);
        let unbuilt = page.items.iter().find(|r| r.name == "def456").unwrap();
        assert_eq!(unbuilt.build_count, 0);
    }

    #[tokio::test]
    async fn build_listing_includes_files() {
        let ledger = test_ledger().await;
        let branch = ledger.get_or_create_branch("42", "main").await.unwrap();
        let revision = ledger.create_revision(&branch.id, "abc123").await.unwrap();
        let build = ledger.create_build(&revision.id).await.unwrap();
        ledger
            .finish_build(&build.id, &[("dist/app.js".into(), "http://x/app.js".into())])
            .await
            .unwrap();

        let page = ledger
            .list_builds("42", "main", "abc123", Pagination::default())
            .await
            .expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].status, BuildStatus::Ready);
        assert_eq!(page.items[0].files.len(), 1);

        let empty = ledger
            .list_builds("42", "main", "zzz999", Pagination::default())
            .await
            .unwrap();
        assert_eq!(empty.total, 0);
        assert!(empty.items.is_empty());
    }
}
