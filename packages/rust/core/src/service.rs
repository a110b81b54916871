//! Build request facade.
//!
//! [`BuildService`] is what the HTTP layer talks to: it validates a build
//! trigger, performs the duplicate-revision rejection, resolves everything a
//! build attempt needs, enqueues the task descriptor, and returns before any
//! build work happens. It also fronts the ledger's listing queries.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};
use url::Url;

use bundleworks_ledger::Ledger;
use bundleworks_scm::{ScmClient, clone_url};
use bundleworks_shared::{
    AppConfig, BranchSummary, Build, BundleworksError, Page, Pagination, Result, RevisionSummary,
};
use bundleworks_store::ArtifactStore;

use crate::executor::{BuildTask, Executor};
use crate::scheduler::Scheduler;

/// Why a build request was turned down. No side effects accompany any of
/// these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// No configured project with that identifier.
    UnknownProject,
    /// The project's branch whitelist does not admit this branch.
    BranchNotAllowed,
    /// The branch tip is already recorded; nothing new to build.
    RevisionUnchanged,
}

impl RejectReason {
    /// Stable wire code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownProject => "UNKNOWN_PROJECT_ID",
            Self::BranchNotAllowed => "BRANCH_NOT_ALLOWED",
            Self::RevisionUnchanged => "REVISION_ALREADY_EXISTS",
        }
    }
}

/// Outcome of a build request. `Accepted` means enqueued, not built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildRequestOutcome {
    Accepted { revision: String },
    Rejected(RejectReason),
}

/// A configured project as exposed by the listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    pub id: String,
    pub name: String,
}

/// Request-path entry point into the build pipeline.
pub struct BuildService<S: ScmClient> {
    config: Arc<AppConfig>,
    scm: Arc<S>,
    ledger: Arc<Ledger>,
    scheduler: Scheduler<BuildTask>,
    scm_base_url: Url,
    scm_token: String,
}

impl<S: ScmClient> BuildService<S> {
    /// Wire the pipeline together: spawn the scheduler with an executor
    /// runner over the shared ledger and store, and return the service.
    pub fn start(
        config: Arc<AppConfig>,
        scm: Arc<S>,
        ledger: Arc<Ledger>,
        store: Arc<ArtifactStore>,
        scm_token: String,
    ) -> Result<Self> {
        let scm_base_url = Url::parse(&config.scm.base_url).map_err(|e| {
            BundleworksError::config(format!("invalid scm base_url {}: {e}", config.scm.base_url))
        })?;

        let executor = Arc::new(Executor::new(ledger.clone(), store));
        let scheduler = Scheduler::start(config.queue.into(), move |task: BuildTask| {
            let executor = executor.clone();
            async move { executor.run(task).await }
        });

        Ok(Self {
            config,
            scm,
            ledger,
            scheduler,
            scm_base_url,
            scm_token,
        })
    }

    /// Validate a build trigger and enqueue the attempt.
    ///
    /// Returns before the build runs. Duplicate requests for an unchanged
    /// branch tip are rejected by the revision insert, so the check and the
    /// reservation are one operation and concurrent duplicates cannot both
    /// reach the executor.
    #[instrument(skip(self))]
    pub async fn request_build(
        &self,
        project_id: &str,
        branch: &str,
    ) -> Result<BuildRequestOutcome> {
        let Some(project) = self.config.find_project(project_id) else {
            return Ok(BuildRequestOutcome::Rejected(RejectReason::UnknownProject));
        };

        if !project.allows_branch(branch) {
            return Ok(BuildRequestOutcome::Rejected(RejectReason::BranchNotAllowed));
        }

        let scm_branch = self.scm.get_branch(project_id, branch).await?;

        let branch_row = self.ledger.get_or_create_branch(project_id, branch).await?;
        let revision = match self
            .ledger
            .create_revision(&branch_row.id, &scm_branch.short_commit_id)
            .await
        {
            Ok(revision) => revision,
            Err(e) if e.is_conflict() => {
                return Ok(BuildRequestOutcome::Rejected(RejectReason::RevisionUnchanged));
            }
            Err(e) => return Err(e),
        };
        self.ledger.touch_branch(&branch_row.id).await?;

        let scm_project = self.scm.get_project(project_id).await?;

        let task = BuildTask {
            project: project.clone(),
            branch: branch.to_string(),
            revision: scm_branch.short_commit_id.clone(),
            revision_id: revision.id,
            clone_url: clone_url(&self.scm_base_url, &self.scm_token, &scm_project),
        };
        self.scheduler.enqueue(task)?;

        info!(
            project = project_id,
            branch,
            revision = %scm_branch.short_commit_id,
            "build request accepted"
        );

        Ok(BuildRequestOutcome::Accepted {
            revision: scm_branch.short_commit_id,
        })
    }

    // -----------------------------------------------------------------------
    // Listing queries
    // -----------------------------------------------------------------------

    /// Configured projects, paginated.
    pub fn list_projects(&self, pagination: Pagination) -> Page<ProjectSummary> {
        let total = self.config.projects.len();
        let start = (pagination.offset as usize).min(total);
        let end = (start + pagination.limit as usize).min(total);

        let items = self.config.projects[start..end]
            .iter()
            .map(|p| ProjectSummary {
                id: p.id.clone(),
                name: p.name.clone(),
            })
            .collect();

        Page::new(items, total as u64, pagination)
    }

    /// Branches of a project with revision counts, paginated.
    pub async fn list_branches(
        &self,
        project_id: &str,
        pagination: Pagination,
    ) -> Result<Page<BranchSummary>> {
        self.ledger.list_branches(project_id, pagination).await
    }

    /// Revisions of a branch with build counts, paginated.
    pub async fn list_revisions(
        &self,
        project_id: &str,
        branch: &str,
        pagination: Pagination,
    ) -> Result<Page<RevisionSummary>> {
        self.ledger.list_revisions(project_id, branch, pagination).await
    }

    /// Builds of a `(branch, revision)` pair with files, paginated.
    /// `None` when the branch was never seen.
    pub async fn list_builds(
        &self,
        project_id: &str,
        branch: &str,
        revision: &str,
        pagination: Pagination,
    ) -> Result<Option<Page<Build>>> {
        if self.ledger.get_branch(project_id, branch).await?.is_none() {
            return Ok(None);
        }

        self.ledger
            .list_builds(project_id, branch, revision, pagination)
            .await
            .map(Some)
    }
}
