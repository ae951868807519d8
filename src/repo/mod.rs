pub mod remote;

pub use remote::{parse_github_remote, RepoSlug};

use std::path::{Path, PathBuf};

use git2::{Delta, DiffDelta, DiffFindOptions, DiffFormat, ErrorCode, Oid, Repository};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::scope::DirectoryScope;

const ORIGIN: &str = "origin";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("Not a git repository: {}", path.display())]
    NotAGitRepository { path: PathBuf },

    #[error("HEAD is detached; pass a PR number explicitly")]
    DetachedHead,

    #[error("Git reference '{reference}' not found locally (fetch it first)")]
    RefNotFound { reference: String },

    #[error("Repository has no '{name}' remote")]
    NoRemote { name: String },

    #[error("Remote URL is not a GitHub repository: {url}")]
    UnsupportedRemote { url: String },

    #[error("Git operation failed: {0}")]
    Git(#[from] git2::Error),
}

/// Read-only view of a local working copy.
///
/// Nothing here fetches, checks out or otherwise mutates the repository;
/// refs must already be resolvable locally.
pub struct LocalRepo {
    repo: Repository,
    workdir: PathBuf,
}

impl std::fmt::Debug for LocalRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalRepo")
            .field("workdir", &self.workdir)
            .finish()
    }
}

impl LocalRepo {
    /// Open the repository containing `path`.
    pub fn open(path: &Path) -> Result<Self, RepoError> {
        let repo = Repository::discover(path).map_err(|err| {
            if err.code() == ErrorCode::NotFound {
                RepoError::NotAGitRepository {
                    path: path.to_path_buf(),
                }
            } else {
                RepoError::Git(err)
            }
        })?;
        let workdir = repo
            .workdir()
            .map(Path::to_path_buf)
            .ok_or_else(|| RepoError::NotAGitRepository {
                path: path.to_path_buf(),
            })?;
        debug!(workdir = %workdir.display(), "opened repository");
        Ok(Self { repo, workdir })
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Name of the branch HEAD points at. Works on unborn branches too.
    pub fn current_branch(&self) -> Result<String, RepoError> {
        let head = self.repo.find_reference("HEAD")?;
        head.symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(str::to_string)
            .ok_or(RepoError::DetachedHead)
    }

    /// Remote-side name of the current branch's upstream, if one is configured.
    pub fn upstream_branch(&self) -> Result<Option<String>, RepoError> {
        let branch = self.current_branch()?;
        let refname = format!("refs/heads/{}", branch);
        let upstream = match self.repo.branch_upstream_name(&refname) {
            Ok(buf) => buf,
            Err(err) if err.code() == ErrorCode::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        Ok(upstream
            .as_str()
            .and_then(|name| name.strip_prefix("refs/remotes/"))
            .and_then(|name| name.split_once('/'))
            .map(|(_remote, branch)| branch.to_string()))
    }

    /// Branch name to look for among open PRs: the upstream's remote name when
    /// tracking is set up, the local branch name otherwise.
    pub fn branch_hint(&self) -> Result<String, RepoError> {
        match self.upstream_branch()? {
            Some(upstream) => Ok(upstream),
            None => self.current_branch(),
        }
    }

    /// Repository identifier derived from the `origin` remote.
    pub fn origin_slug(&self) -> Result<RepoSlug, RepoError> {
        let remote = self.repo.find_remote(ORIGIN).map_err(|err| {
            if err.code() == ErrorCode::NotFound {
                RepoError::NoRemote {
                    name: ORIGIN.to_string(),
                }
            } else {
                RepoError::Git(err)
            }
        })?;
        let url = remote.url().ok_or_else(|| RepoError::UnsupportedRemote {
            url: "(no URL)".to_string(),
        })?;
        parse_github_remote(url)
    }

    /// Paths changed on `head_ref` since it diverged from `base_ref`,
    /// restricted to `scope`. An empty result is valid.
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn changed_files(
        &self,
        base_ref: &str,
        head_ref: &str,
        scope: &DirectoryScope,
    ) -> Result<Vec<String>, RepoError> {
        let diff = self.diff_between(base_ref, head_ref)?;
        let mut files: Vec<String> = Vec::new();
        for delta in diff.deltas() {
            let Some(path) = delta_path(&delta) else { continue };
            if scope.contains(&path) && !files.contains(&path) {
                files.push(path);
            }
        }
        debug!(files = files.len(), "computed changed files");
        Ok(files)
    }

    /// Unified diff text for the same range as [`LocalRepo::changed_files`].
    #[instrument(skip(self), fields(scope = %scope))]
    pub fn diff_text(
        &self,
        base_ref: &str,
        head_ref: &str,
        scope: &DirectoryScope,
    ) -> Result<String, RepoError> {
        let diff = self.diff_between(base_ref, head_ref)?;
        let mut text = String::new();
        diff.print(DiffFormat::Patch, |delta, _hunk, line| {
            if !delta_path(&delta).is_some_and(|path| scope.contains(&path)) {
                return true;
            }
            if matches!(line.origin(), '+' | '-' | ' ') {
                text.push(line.origin());
            }
            text.push_str(&String::from_utf8_lossy(line.content()));
            true
        })?;
        debug!(diff_bytes = text.len(), "rendered local diff");
        Ok(text)
    }

    /// Full merge-base diff. Scoping is applied by the callers with
    /// [`DirectoryScope::contains`], so directory names are matched literally
    /// rather than as pathspec globs.
    fn diff_between(&self, base_ref: &str, head_ref: &str) -> Result<git2::Diff<'_>, RepoError> {
        let base = self.resolve_commit(base_ref)?;
        let head = self.resolve_commit(head_ref)?;
        let merge_base = self.repo.merge_base(base, head)?;

        let old_tree = self.repo.find_commit(merge_base)?.tree()?;
        let new_tree = self.repo.find_commit(head)?.tree()?;

        let mut diff = self
            .repo
            .diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;
        diff.find_similar(Some(DiffFindOptions::new().renames(true)))?;
        Ok(diff)
    }

    /// Resolve a branch name, preferring the remote-tracking copy from origin.
    fn resolve_commit(&self, reference: &str) -> Result<Oid, RepoError> {
        let candidates = [format!("{}/{}", ORIGIN, reference), reference.to_string()];
        for candidate in &candidates {
            if let Ok(object) = self.repo.revparse_single(candidate) {
                if let Ok(commit) = object.peel_to_commit() {
                    debug!(reference, resolved = %candidate, "resolved ref");
                    return Ok(commit.id());
                }
            }
        }
        Err(RepoError::RefNotFound {
            reference: reference.to_string(),
        })
    }
}

/// Repository-relative path of a delta, using the old side for deletions.
fn delta_path(delta: &DiffDelta<'_>) -> Option<String> {
    let file = if delta.status() == Delta::Deleted {
        delta.old_file()
    } else {
        delta.new_file()
    };
    file.path()
        .map(|path| path.to_string_lossy().replace('\\', "/"))
}
