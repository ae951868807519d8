pub mod diff;
pub mod service;
pub mod types;

pub use service::{GitHubClient, PullRequestService};
pub use types::{Auth, PullRequestPayload, PullRequestRecord};

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::repo::RepoSlug;

#[derive(Debug, Error)]
pub enum PrError {
    #[error("PR #{number} not found in {repo}")]
    PrNotFound { repo: String, number: u64 },

    #[error("No open PR found for branch '{branch}' in {repo}")]
    NoMatchingPr { repo: String, branch: String },

    #[error("Branch '{branch}' has several open PRs ({}); pass one explicitly", format_candidates(.candidates))]
    AmbiguousPr { branch: String, candidates: Vec<u64> },

    #[error("Authentication required: {message}")]
    AuthenticationRequired { message: String },

    #[error("GitHub API rate limit exceeded: {message}")]
    RateLimited { message: String },

    #[error("Request to GitHub timed out: {0}")]
    Timeout(String),

    #[error("Incomplete PR record: {reason}")]
    IncompleteRecord { reason: String },

    #[error("Network error talking to GitHub: {0}")]
    Network(String),

    #[error("GitHub API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for PrError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PrError::Timeout(err.to_string())
        } else if err.is_decode() {
            PrError::IncompleteRecord {
                reason: format!("unexpected response shape: {}", err),
            }
        } else {
            PrError::Network(err.to_string())
        }
    }
}

fn format_candidates(candidates: &[u64]) -> String {
    candidates
        .iter()
        .map(|number| format!("#{}", number))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Finds the pull request a collection is about and builds its record.
pub struct PrResolver<'a, S: PullRequestService> {
    service: &'a S,
    repo: RepoSlug,
}

impl<'a, S: PullRequestService> PrResolver<'a, S> {
    pub fn new(service: &'a S, repo: RepoSlug) -> Self {
        Self { service, repo }
    }

    /// Resolve a PR either by explicit number or by the branch it was opened from.
    ///
    /// Auto-detection never guesses: zero matches is `NoMatchingPr`, more than
    /// one is `AmbiguousPr`. Metadata and diff are fetched together and the
    /// record is only returned when both arrived intact.
    #[instrument(skip(self, auth), fields(repo = %self.repo))]
    pub async fn resolve(
        &self,
        explicit_id: Option<u64>,
        branch_hint: Option<&str>,
        auth: &Auth,
    ) -> Result<PullRequestRecord, PrError> {
        let payload = match explicit_id {
            Some(number) => {
                info!(pr = number, "fetching PR by number");
                self.service
                    .get_pull_request(&self.repo, number, auth)
                    .await?
                    .ok_or_else(|| PrError::PrNotFound {
                        repo: self.repo.to_string(),
                        number,
                    })?
            }
            None => {
                let branch = branch_hint.ok_or_else(|| PrError::NoMatchingPr {
                    repo: self.repo.to_string(),
                    branch: "(none)".to_string(),
                })?;
                self.detect(branch, auth).await?
            }
        };

        let number = payload.number.ok_or_else(|| PrError::IncompleteRecord {
            reason: "response is missing 'number'".to_string(),
        })?;
        let diff_text = self
            .service
            .get_diff(&self.repo, number, auth)
            .await
            .map_err(|err| PrError::IncompleteRecord {
                reason: format!("diff for PR #{} unavailable: {}", number, err),
            })?;

        let record = PullRequestRecord::from_parts(payload, diff_text)?;
        info!(pr = record.number, files = record.changed_files.len(), "resolved PR");
        Ok(record)
    }

    /// Open PRs whose head branch is `branch`, trying the owner-qualified
    /// lookup first and falling back to a scan that also sees fork PRs.
    async fn detect(&self, branch: &str, auth: &Auth) -> Result<PullRequestPayload, PrError> {
        info!(branch, "auto-detecting PR from branch");
        let mut matches = head_matches(
            self.service
                .list_pull_requests(&self.repo, branch, auth)
                .await?,
            branch,
        );
        if matches.is_empty() {
            debug!(branch, "no owner-qualified match, scanning all open PRs");
            matches = head_matches(
                self.service
                    .list_open_pull_requests(&self.repo, auth)
                    .await?,
                branch,
            );
        }

        let mut unique: Vec<(u64, PullRequestPayload)> = Vec::new();
        for payload in matches {
            let number = payload.number.ok_or_else(|| PrError::IncompleteRecord {
                reason: "listed PR is missing 'number'".to_string(),
            })?;
            if !unique.iter().any(|(seen, _)| *seen == number) {
                unique.push((number, payload));
            }
        }

        if unique.len() > 1 {
            let candidates: Vec<u64> = unique.iter().map(|(number, _)| *number).collect();
            warn!(branch, ?candidates, "several open PRs share this head branch");
            return Err(PrError::AmbiguousPr {
                branch: branch.to_string(),
                candidates,
            });
        }

        match unique.pop() {
            Some((number, payload)) => {
                debug!(pr = number, "matched PR for branch");
                Ok(payload)
            }
            None => Err(PrError::NoMatchingPr {
                repo: self.repo.to_string(),
                branch: branch.to_string(),
            }),
        }
    }
}

fn head_matches(pulls: Vec<PullRequestPayload>, branch: &str) -> Vec<PullRequestPayload> {
    pulls
        .into_iter()
        .filter(|payload| payload.head_ref() == Some(branch))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::service::MockPullRequestService;
    use super::types::tests::full_payload;
    use super::types::BranchPayload;
    use super::*;
    use mockall::predicate::eq;

    const DIFF: &str = "diff --git a/src/auth/login.py b/src/auth/login.py\n--- a/src/auth/login.py\n+++ b/src/auth/login.py\n@@ -1 +1 @@\n-a\n+b\n";

    fn slug() -> RepoSlug {
        RepoSlug {
            owner: "octo".to_string(),
            name: "cat".to_string(),
        }
    }

    fn payload(number: u64, head: &str) -> PullRequestPayload {
        let mut payload = full_payload();
        payload.number = Some(number);
        payload.head = Some(BranchPayload {
            ref_name: Some(head.to_string()),
        });
        payload
    }

    #[tokio::test]
    async fn test_explicit_id_fetches_metadata_and_diff() {
        let mut service = MockPullRequestService::new();
        service
            .expect_get_pull_request()
            .withf(|_, number, _| *number == 42)
            .times(1)
            .returning(|_, _, _| Ok(Some(payload(42, "fix-login"))));
        service
            .expect_get_diff()
            .withf(|_, number, _| *number == 42)
            .times(1)
            .returning(|_, _, _| Ok(DIFF.to_string()));
        service.expect_list_pull_requests().never();

        let resolver = PrResolver::new(&service, slug());
        let record = resolver.resolve(Some(42), None, &Auth::Anonymous).await.unwrap();
        assert_eq!(record.number, 42);
        assert_eq!(record.changed_files, vec!["src/auth/login.py"]);
    }

    #[tokio::test]
    async fn test_explicit_id_missing_is_pr_not_found() {
        let mut service = MockPullRequestService::new();
        service
            .expect_get_pull_request()
            .returning(|_, _, _| Ok(None));
        service.expect_get_diff().never();

        let resolver = PrResolver::new(&service, slug());
        let err = resolver.resolve(Some(999), None, &Auth::Anonymous).await.unwrap_err();
        assert!(matches!(err, PrError::PrNotFound { number: 999, .. }));
    }

    #[tokio::test]
    async fn test_auto_detect_single_match() {
        let mut service = MockPullRequestService::new();
        service
            .expect_list_pull_requests()
            .with(eq(slug()), eq("feature"), mockall::predicate::always())
            .returning(|_, _, _| Ok(vec![payload(7, "feature")]));
        service
            .expect_get_diff()
            .returning(|_, _, _| Ok(DIFF.to_string()));
        service.expect_get_pull_request().never();

        let resolver = PrResolver::new(&service, slug());
        let record = resolver
            .resolve(None, Some("feature"), &Auth::Anonymous)
            .await
            .unwrap();
        assert_eq!(record.number, 7);
    }

    #[tokio::test]
    async fn test_auto_detect_no_match() {
        let mut service = MockPullRequestService::new();
        service
            .expect_list_pull_requests()
            .returning(|_, _, _| Ok(vec![]));
        service
            .expect_list_open_pull_requests()
            .returning(|_, _| Ok(vec![payload(3, "other-branch")]));

        let resolver = PrResolver::new(&service, slug());
        let err = resolver
            .resolve(None, Some("feature"), &Auth::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, PrError::NoMatchingPr { branch, .. } if branch == "feature"));
    }

    #[tokio::test]
    async fn test_auto_detect_two_matches_is_ambiguous() {
        let mut service = MockPullRequestService::new();
        service
            .expect_list_pull_requests()
            .returning(|_, _, _| Ok(vec![payload(11, "feature"), payload(12, "feature")]));
        service.expect_get_diff().never();

        let resolver = PrResolver::new(&service, slug());
        let err = resolver
            .resolve(None, Some("feature"), &Auth::Anonymous)
            .await
            .unwrap_err();
        match err {
            PrError::AmbiguousPr { candidates, .. } => assert_eq!(candidates, vec![11, 12]),
            other => panic!("expected AmbiguousPr, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_auto_detect_falls_back_to_fork_scan() {
        let mut service = MockPullRequestService::new();
        service
            .expect_list_pull_requests()
            .returning(|_, _, _| Ok(vec![]));
        service
            .expect_list_open_pull_requests()
            .returning(|_, _| Ok(vec![payload(5, "main-fix"), payload(9, "feature"), payload(9, "feature")]));
        service
            .expect_get_diff()
            .withf(|_, number, _| *number == 9)
            .returning(|_, _, _| Ok(String::new()));

        let resolver = PrResolver::new(&service, slug());
        let record = resolver
            .resolve(None, Some("feature"), &Auth::Anonymous)
            .await
            .unwrap();
        assert_eq!(record.number, 9);
        assert!(record.changed_files.is_empty());
    }

    #[tokio::test]
    async fn test_diff_failure_is_incomplete_record() {
        let mut service = MockPullRequestService::new();
        service
            .expect_get_pull_request()
            .returning(|_, _, _| Ok(Some(payload(42, "fix-login"))));
        service.expect_get_diff().returning(|_, _, _| {
            Err(PrError::Api {
                status: 500,
                message: "boom".to_string(),
            })
        });

        let resolver = PrResolver::new(&service, slug());
        let err = resolver.resolve(Some(42), None, &Auth::Anonymous).await.unwrap_err();
        assert!(matches!(err, PrError::IncompleteRecord { reason } if reason.contains("boom")));
    }

    #[tokio::test]
    async fn test_remote_failures_pass_through() {
        let mut service = MockPullRequestService::new();
        service.expect_get_pull_request().returning(|_, _, _| {
            Err(PrError::RateLimited {
                message: "slow down".to_string(),
            })
        });

        let resolver = PrResolver::new(&service, slug());
        let err = resolver.resolve(Some(1), None, &Auth::Anonymous).await.unwrap_err();
        assert!(matches!(err, PrError::RateLimited { .. }));
    }

    #[test]
    fn test_ambiguous_message_lists_candidates() {
        let err = PrError::AmbiguousPr {
            branch: "feature".to_string(),
            candidates: vec![11, 12],
        };
        assert!(err.to_string().contains("#11, #12"));
    }
}
