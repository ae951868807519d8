use std::fmt;

use secrecy::SecretString;
use serde::Deserialize;

use super::diff;
use super::PrError;

/// Credentials for the remote service. Supplied by the caller on every call.
#[derive(Debug, Default)]
pub enum Auth {
    #[default]
    Anonymous,
    Token(SecretString),
}

impl Auth {
    pub fn from_token(token: Option<String>) -> Self {
        match token {
            Some(token) if !token.trim().is_empty() => Auth::Token(SecretString::from(token)),
            _ => Auth::Anonymous,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, Auth::Anonymous)
    }
}

/// Raw pull request object as returned by the GitHub REST API.
///
/// Every field is optional here; [`PullRequestRecord::from_parts`] decides
/// which ones are required.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequestPayload {
    pub number: Option<u64>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<String>,
    pub html_url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub user: Option<UserPayload>,
    pub base: Option<BranchPayload>,
    pub head: Option<BranchPayload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserPayload {
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BranchPayload {
    #[serde(rename = "ref")]
    pub ref_name: Option<String>,
}

impl PullRequestPayload {
    pub fn head_ref(&self) -> Option<&str> {
        self.head.as_ref().and_then(|head| head.ref_name.as_deref())
    }

    pub fn author(&self) -> Option<&str> {
        self.user.as_ref().and_then(|user| user.login.as_deref())
    }
}

/// Immutable snapshot of one pull request: metadata plus its diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub base_branch: String,
    pub head_branch: String,
    pub description: String,
    pub state: Option<String>,
    pub url: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    /// Changed paths in diff order, each listed once.
    pub changed_files: Vec<String>,
    /// Full unified diff text.
    pub diff: String,
    /// The diff split per file.
    pub patches: Vec<FilePatch>,
}

impl PullRequestRecord {
    /// Validate an API payload and attach its diff.
    ///
    /// Fails with `IncompleteRecord` if any required field is missing or the
    /// diff cannot be split into file patches.
    pub fn from_parts(payload: PullRequestPayload, diff_text: String) -> Result<Self, PrError> {
        let missing = |field: &str| PrError::IncompleteRecord {
            reason: format!("response is missing '{}'", field),
        };

        let number = payload.number.filter(|n| *n > 0).ok_or_else(|| missing("number"))?;
        let title = payload
            .title
            .clone()
            .filter(|title| !title.trim().is_empty())
            .ok_or_else(|| missing("title"))?;
        let author = payload.author().ok_or_else(|| missing("user.login"))?.to_string();
        let base_branch = payload
            .base
            .and_then(|base| base.ref_name)
            .ok_or_else(|| missing("base.ref"))?;
        let head_branch = payload
            .head
            .and_then(|head| head.ref_name)
            .ok_or_else(|| missing("head.ref"))?;

        let patches = diff::parse_diff(&diff_text)?;
        let changed_files = diff::changed_paths(&patches);

        Ok(PullRequestRecord {
            number,
            title,
            author,
            base_branch,
            head_branch,
            description: payload.body.unwrap_or_default(),
            state: payload.state,
            url: payload.html_url,
            created_at: payload.created_at,
            updated_at: payload.updated_at,
            changed_files,
            diff: diff_text,
            patches,
        })
    }

    /// Replace the diff with one computed from the local repository.
    pub fn with_local_diff(
        self,
        changed_files: Vec<String>,
        diff_text: String,
    ) -> Result<Self, PrError> {
        let patches = diff::parse_diff(&diff_text)?;
        Ok(PullRequestRecord {
            changed_files,
            diff: diff_text,
            patches,
            ..self
        })
    }

    pub fn patch_for(&self, path: &str) -> Option<&FilePatch> {
        self.patches.iter().find(|patch| patch.path == path)
    }
}

/// How a file was changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Deleted,
    Renamed,
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Added => write!(f, "added"),
            ChangeKind::Deleted => write!(f, "deleted"),
            ChangeKind::Renamed => write!(f, "renamed"),
            ChangeKind::Modified => write!(f, "modified"),
        }
    }
}

/// One file's section of a unified diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    /// Path after the change (e.g., "src/auth/login.py")
    pub path: String,
    /// Path before a rename
    pub previous_path: Option<String>,
    pub change: ChangeKind,
    pub additions: usize,
    pub deletions: usize,
    /// Exact text of the section, starting at its `diff --git` line
    pub text: String,
}
