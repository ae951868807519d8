use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, instrument};

use crate::artifact::{self, ArtifactError, CollectionResult};
use crate::pr::{Auth, PrError, PrResolver, PullRequestService};
use crate::repo::{LocalRepo, RepoError};
use crate::scope::{DirectoryScope, ScopeError};

/// Any failure of a single collection. Each source keeps its own variants.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Pr(#[from] PrError),

    #[error(transparent)]
    Scope(#[from] ScopeError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Where the diff in the document comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DiffSource {
    /// The hosting service's diff for the PR.
    #[default]
    Remote,
    /// `origin/<base>...origin/<head>` from the local repository.
    Local,
}

#[derive(Debug, Clone, Default)]
pub struct CollectRequest {
    pub pr_number: Option<u64>,
    pub repo_path: PathBuf,
    pub target_dir: Option<String>,
    pub output: Option<PathBuf>,
    pub diff_source: DiffSource,
}

#[derive(Debug)]
pub struct Collected {
    pub result: CollectionResult,
    /// Set when the artifact was written to disk.
    pub written_to: Option<PathBuf>,
}

/// Run one collection: read local state, resolve the PR, compose the
/// document and, if an output location was given, write it.
///
/// The scope is validated before any network call, and nothing is written
/// unless every earlier step succeeded.
#[instrument(skip(service, request, auth), fields(repo_path = %request.repo_path.display()))]
pub async fn collect<S: PullRequestService>(
    service: &S,
    request: &CollectRequest,
    auth: &Auth,
) -> Result<Collected, CollectError> {
    let local = LocalRepo::open(&request.repo_path)?;
    let scope = DirectoryScope::parse(request.target_dir.as_deref(), Some(local.workdir()))?;
    let slug = local.origin_slug()?;

    let branch_hint = match request.pr_number {
        Some(_) => None,
        None => Some(local.branch_hint()?),
    };

    let record = PrResolver::new(service, slug)
        .resolve(request.pr_number, branch_hint.as_deref(), auth)
        .await?;

    let record = match request.diff_source {
        DiffSource::Remote => record,
        DiffSource::Local => {
            info!(base = %record.base_branch, head = %record.head_branch, "using local diff");
            let files = local.changed_files(&record.base_branch, &record.head_branch, &scope)?;
            let diff = local.diff_text(&record.base_branch, &record.head_branch, &scope)?;
            record.with_local_diff(files, diff)?
        }
    };

    let result = artifact::compose(&record, &scope);
    let written_to = match &request.output {
        Some(output) => Some(artifact::write(&result, output)?),
        None => None,
    };
    info!(filename = %result.filename, written = written_to.is_some(), "collection complete");

    Ok(Collected { result, written_to })
}

/// One row of the open-PR listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrSummary {
    pub number: u64,
    pub title: String,
    pub branch: String,
    pub author: String,
    /// `YYYY-MM-DD`, empty when unknown
    pub created: String,
}

/// Open PRs of the repository at `repo_path`, in the order the service returns them.
#[instrument(skip(service, auth))]
pub async fn list_open_prs<S: PullRequestService>(
    service: &S,
    repo_path: &Path,
    auth: &Auth,
) -> Result<Vec<PrSummary>, CollectError> {
    let slug = LocalRepo::open(repo_path)?.origin_slug()?;
    let pulls = service.list_open_pull_requests(&slug, auth).await?;
    Ok(pulls
        .into_iter()
        .filter_map(|payload| {
            Some(PrSummary {
                number: payload.number?,
                branch: payload.head_ref().unwrap_or_default().to_string(),
                author: payload.author().unwrap_or_default().to_string(),
                created: payload
                    .created_at
                    .as_deref()
                    .and_then(|created| created.get(..10))
                    .unwrap_or_default()
                    .to_string(),
                title: payload.title.unwrap_or_default(),
            })
        })
        .collect())
}
