//! Build executor: one build attempt end-to-end.
//!
//! A [`BuildTask`] is a plain descriptor resolved by the request path before
//! enqueue — project config snapshot, branch, revision, clone URL — so the
//! queue carries no captured collaborator state. The [`Executor`] owns the
//! collaborator handles and turns a descriptor into a cloned, built, and
//! published artifact set:
//!
//! clone → build commands → publish dist files → swap `@latest` → record.
//!
//! Any step failure abandons the attempt and marks the build `Failed`; the
//! temporary working directory is removed on every exit path.

use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use bundleworks_ledger::Ledger;
use bundleworks_shared::{BundleworksError, ProjectConfig, Result};
use bundleworks_store::{ArtifactStore, PublishedFile};

use crate::shell;

/// Everything one build attempt needs, resolved before enqueue.
#[derive(Debug, Clone)]
pub struct BuildTask {
    /// Snapshot of the project configuration at request time.
    pub project: ProjectConfig,
    /// Branch name as known to source control.
    pub branch: String,
    /// Commit short id being built; keys the artifact paths.
    pub revision: String,
    /// Ledger row id of the revision, created by the request path.
    pub revision_id: String,
    /// Authenticated clone URL for the project repository.
    pub clone_url: String,
}

/// Stateless runner for build attempts; holds the collaborator handles.
pub struct Executor {
    ledger: Arc<Ledger>,
    store: Arc<ArtifactStore>,
}

impl Executor {
    pub fn new(ledger: Arc<Ledger>, store: Arc<ArtifactStore>) -> Self {
        Self { ledger, store }
    }

    /// Run one build attempt to completion.
    ///
    /// Errors are terminal for the attempt: the build row ends `Failed`,
    /// nothing is retried, and the error is surfaced to the scheduler's
    /// batch runner for logging only.
    #[instrument(skip_all, fields(
        project = %task.project.id,
        branch = %task.branch,
        revision = %task.revision,
    ))]
    pub async fn run(&self, task: BuildTask) -> Result<()> {
        let build = self.ledger.create_build(&task.revision_id).await?;
        info!(build_id = %build.id, "build attempt started");

        let result = self.attempt(&task, &build.id).await;

        match &result {
            Ok(files) => {
                info!(build_id = %build.id, files = files.len(), "build ready");
            }
            Err(e) => {
                warn!(build_id = %build.id, error = %e, "build attempt failed");
                if let Err(mark_err) = self.ledger.mark_build_failed(&build.id).await {
                    error!(build_id = %build.id, error = %mark_err, "failed to record failed status");
                }
            }
        }

        // The working directory is removed last on every exit path, including
        // the stale-leftover rejection below.
        if let Err(cleanup_err) =
            self.store
                .remove_tmp_dir(&task.project.id, &task.branch, &task.revision)
        {
            warn!(error = %cleanup_err, "failed to clear tmp dir");
        }

        result.map(|_| ())
    }

    async fn attempt(&self, task: &BuildTask, build_id: &str) -> Result<Vec<PublishedFile>> {
        let project_id = &task.project.id;
        let tmp = self.store.tmp_build_path(project_id, &task.branch, &task.revision);

        // A leftover directory from a crashed run is an error, never silently
        // reused: the clone below requires an empty target anyway.
        if self.store.has_tmp_dir(project_id, &task.branch, &task.revision) {
            return Err(BundleworksError::conflict(format!(
                "tmp dir already exists, skip: {}",
                tmp.display()
            )));
        }

        let tmp_str = tmp.to_string_lossy();
        shell::run(
            "git",
            &[
                "clone",
                "--single-branch",
                "--branch",
                &task.branch,
                &task.clone_url,
                tmp_str.as_ref(),
            ],
            None,
        )
        .await?;

        for line in &task.project.build_commands {
            let (program, args) = shell::split_command(line).ok_or_else(|| {
                BundleworksError::validation(format!("empty build command in project {project_id}"))
            })?;
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            shell::run(&program, &args, Some(&tmp)).await?;
        }

        self.publish_and_record(task, build_id, &tmp).await
    }

    /// Publish the dist files out of a completed working directory, swap the
    /// branch marker, and record the ready build with its file batch.
    async fn publish_and_record(
        &self,
        task: &BuildTask,
        build_id: &str,
        tmp: &std::path::Path,
    ) -> Result<Vec<PublishedFile>> {
        let project_id = &task.project.id;

        self.store
            .ensure_revision_dirs(project_id, &task.branch, &task.revision)?;

        let files = self.store.publish_dist_files(
            project_id,
            &task.branch,
            &task.revision,
            &task.project.dist_files,
            tmp,
        )?;

        self.store.set_latest(project_id, &task.branch, &task.revision)?;

        let records: Vec<(String, String)> = files
            .iter()
            .map(|f| (f.path.clone(), f.web_path.clone()))
            .collect();
        self.ledger.finish_build(build_id, &records).await?;

        Ok(files)
    }
}
