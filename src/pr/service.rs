use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::types::{Auth, PullRequestPayload};
use super::PrError;
use crate::repo::RepoSlug;

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("pr-collector/", env!("CARGO_PKG_VERSION"));
const JSON_MEDIA_TYPE: &str = "application/vnd.github+json";
const DIFF_MEDIA_TYPE: &str = "application/vnd.github.diff";
const PER_PAGE: usize = 100;
const MAX_PAGES: usize = 20;

/// Read-only access to pull requests on the hosting service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PullRequestService: Send + Sync {
    /// Fetch one pull request. `Ok(None)` when the number does not exist.
    async fn get_pull_request(
        &self,
        repo: &RepoSlug,
        number: u64,
        auth: &Auth,
    ) -> Result<Option<PullRequestPayload>, PrError>;

    /// Open pull requests whose head is `<owner>:<head_branch>`.
    async fn list_pull_requests(
        &self,
        repo: &RepoSlug,
        head_branch: &str,
        auth: &Auth,
    ) -> Result<Vec<PullRequestPayload>, PrError>;

    /// Every open pull request, including those opened from forks.
    async fn list_open_pull_requests(
        &self,
        repo: &RepoSlug,
        auth: &Auth,
    ) -> Result<Vec<PullRequestPayload>, PrError>;

    /// Unified diff of a pull request.
    async fn get_diff(&self, repo: &RepoSlug, number: u64, auth: &Auth)
        -> Result<String, PrError>;
}

/// GitHub REST API client.
///
/// Transport concerns (timeouts, TLS, user agent) live here; it never retries.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: String,
}

impl GitHubClient {
    pub fn new(api_base: &str, timeout: Duration) -> Result<Self, PrError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn request(&self, path: &str, accept: &str, auth: &Auth) -> RequestBuilder {
        let builder = self
            .http
            .get(format!("{}{}", self.api_base, path))
            .header(ACCEPT, accept)
            .header("X-GitHub-Api-Version", "2022-11-28");
        match auth {
            Auth::Anonymous => builder,
            Auth::Token(token) => builder.bearer_auth(token.expose_secret()),
        }
    }

    /// False when the repository itself answers 404, which is how GitHub
    /// hides private repositories from callers without access.
    async fn repository_visible(&self, repo: &RepoSlug, auth: &Auth) -> Result<bool, PrError> {
        let path = format!("/repos/{}/{}", repo.owner, repo.name);
        let response = self.request(&path, JSON_MEDIA_TYPE, auth).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        check_status(response, auth).await?;
        Ok(true)
    }

    async fn list_page(
        &self,
        repo: &RepoSlug,
        query: &[(&str, String)],
        auth: &Auth,
    ) -> Result<Vec<PullRequestPayload>, PrError> {
        let path = format!("/repos/{}/{}/pulls", repo.owner, repo.name);
        let response = self
            .request(&path, JSON_MEDIA_TYPE, auth)
            .query(query)
            .send()
            .await?;
        let response = check_status(response, auth).await?;
        Ok(response.json::<Vec<PullRequestPayload>>().await?)
    }
}

#[async_trait]
impl PullRequestService for GitHubClient {
    #[instrument(skip(self, auth), fields(repo = %repo))]
    async fn get_pull_request(
        &self,
        repo: &RepoSlug,
        number: u64,
        auth: &Auth,
    ) -> Result<Option<PullRequestPayload>, PrError> {
        let path = format!("/repos/{}/{}/pulls/{}", repo.owner, repo.name, number);
        debug!("fetching PR metadata from GitHub API");
        let response = self.request(&path, JSON_MEDIA_TYPE, auth).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            if auth.is_anonymous() && !self.repository_visible(repo, auth).await? {
                return Err(PrError::AuthenticationRequired {
                    message: format!("{} is not visible without a token; provide one", repo),
                });
            }
            debug!("PR not found");
            return Ok(None);
        }
        let response = check_status(response, auth).await?;
        let payload = response.json::<PullRequestPayload>().await?;
        debug!(title = ?payload.title, "received PR metadata");
        Ok(Some(payload))
    }

    #[instrument(skip(self, auth), fields(repo = %repo))]
    async fn list_pull_requests(
        &self,
        repo: &RepoSlug,
        head_branch: &str,
        auth: &Auth,
    ) -> Result<Vec<PullRequestPayload>, PrError> {
        let query = [
            ("state", "open".to_string()),
            ("head", format!("{}:{}", repo.owner, head_branch)),
            ("per_page", PER_PAGE.to_string()),
        ];
        let pulls = self.list_page(repo, &query, auth).await?;
        debug!(matches = pulls.len(), "listed PRs by head");
        Ok(pulls)
    }

    #[instrument(skip(self, auth), fields(repo = %repo))]
    async fn list_open_pull_requests(
        &self,
        repo: &RepoSlug,
        auth: &Auth,
    ) -> Result<Vec<PullRequestPayload>, PrError> {
        let mut pulls = Vec::new();
        let mut exhausted = false;
        for page in 1..=MAX_PAGES {
            let query = [
                ("state", "open".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let batch = self.list_page(repo, &query, auth).await?;
            let last_page = batch.len() < PER_PAGE;
            pulls.extend(batch);
            if last_page {
                exhausted = true;
                break;
            }
        }
        if !exhausted {
            warn!(
                limit = MAX_PAGES * PER_PAGE,
                "open PR scan hit the page limit; later PRs were not checked"
            );
        }
        debug!(open = pulls.len(), "listed open PRs");
        Ok(pulls)
    }

    #[instrument(skip(self, auth), fields(repo = %repo))]
    async fn get_diff(
        &self,
        repo: &RepoSlug,
        number: u64,
        auth: &Auth,
    ) -> Result<String, PrError> {
        let path = format!("/repos/{}/{}/pulls/{}", repo.owner, repo.name, number);
        debug!("fetching PR diff from GitHub API");
        let response = self.request(&path, DIFF_MEDIA_TYPE, auth).send().await?;
        let diff_text = check_status(response, auth).await?.text().await?;
        debug!(diff_bytes = diff_text.len(), "received PR diff");
        Ok(diff_text)
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

async fn check_status(response: Response, auth: &Auth) -> Result<Response, PrError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    Err(map_status(status, &headers, &body, auth))
}

/// Translate a non-success response into a failure kind.
fn map_status(status: StatusCode, headers: &HeaderMap, body: &str, auth: &Auth) -> PrError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|parsed| parsed.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                trimmed.to_string()
            }
        });

    let quota_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|remaining| remaining.trim() == "0");
    let mentions_rate_limit = message.to_lowercase().contains("rate limit");

    match status {
        StatusCode::TOO_MANY_REQUESTS => PrError::RateLimited { message },
        StatusCode::FORBIDDEN if quota_exhausted || mentions_rate_limit => {
            PrError::RateLimited { message }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PrError::AuthenticationRequired {
            message: if auth.is_anonymous() {
                format!("GitHub returned {}: {}; provide a token", status, message)
            } else {
                format!("GitHub rejected the token ({}): {}", status, message)
            },
        },
        // GitHub hides private repositories behind 404 for anonymous callers.
        StatusCode::NOT_FOUND if auth.is_anonymous() => PrError::AuthenticationRequired {
            message: "repository not found or private; provide a token".to_string(),
        },
        _ => PrError::Api {
            status: status.as_u16(),
            message,
        },
    }
}
