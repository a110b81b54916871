//! SQL migration definitions for the build ledger.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a set of SQL statements executed as one batch.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: branches, revisions, builds, build_files",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Branches tracked per configured project
CREATE TABLE IF NOT EXISTS branches (
    id         TEXT PRIMARY KEY,
    project_id TEXT NOT NULL,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(project_id, name)
);

CREATE INDEX IF NOT EXISTS idx_branches_project ON branches(project_id);

-- Revisions: one row per built commit of a branch
CREATE TABLE IF NOT EXISTS revisions (
    id         TEXT PRIMARY KEY,
    branch_id  TEXT NOT NULL REFERENCES branches(id) ON DELETE CASCADE,
    name       TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(branch_id, name)
);

CREATE INDEX IF NOT EXISTS idx_revisions_branch ON revisions(branch_id);

-- Builds: at most one per revision
CREATE TABLE IF NOT EXISTS builds (
    id          TEXT PRIMARY KEY,
    revision_id TEXT NOT NULL UNIQUE REFERENCES revisions(id) ON DELETE CASCADE,
    status      TEXT NOT NULL,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- Published files of a ready build
CREATE TABLE IF NOT EXISTS build_files (
    id       TEXT PRIMARY KEY,
    build_id TEXT NOT NULL REFERENCES builds(id) ON DELETE CASCADE,
    path     TEXT NOT NULL,
    web_path TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_build_files_build ON build_files(build_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
