//! GitHub REST client
//!
//! Every call carries the versioned `Accept` header and, when a token is
//! supplied, a bearer token. Reads are retried with exponential backoff on
//! transport errors, 429 and 5xx. Writes go out exactly once.

use crate::api::HostingApi;
use crate::types::{
    ContentResponse, CreateRefRequest, NewPullRequest, PullRequest, PutFileRequest, RefResponse,
};
use async_trait::async_trait;
use metamorph_core::{GithubConfig, MetamorphError, RepoId, Result};
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, info, warn};

const ACCEPT: &str = "application/vnd.github.v3+json";
const USER_AGENT: &str = concat!("metamorph/", env!("CARGO_PKG_VERSION"));

// Backoff ceiling for retried reads
const MAX_BACKOFF: Duration = Duration::from_secs(8);

/// Retry configuration for safe reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff: MAX_BACKOFF,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Hosting platform client backed by `reqwest`
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    api_base: Url,
    request_timeout: Duration,
    archive_timeout: Duration,
    retry: RetryPolicy,
}

impl GitHubClient {
    /// Create a client from the `[github]` config section
    pub fn new(config: &GithubConfig) -> Result<Self> {
        let api_base = Url::parse(&config.api_base).map_err(|e| {
            MetamorphError::Configuration(format!(
                "Invalid github.api_base '{}': {}",
                config.api_base, e
            ))
        })?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| MetamorphError::Http(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            api_base,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            archive_timeout: Duration::from_secs(config.archive_timeout_secs),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.initial_backoff_ms),
            ),
        })
    }

    /// Override the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// `<api_base>/repos/<owner>/<name>/<segments...>`, each segment escaped
    fn repo_url<'a>(
        &self,
        repo: &RepoId,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| {
                MetamorphError::Configuration(format!(
                    "github.api_base '{}' cannot carry a path",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(["repos", repo.owner(), repo.name()])
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .http
            .request(method, url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .timeout(self.request_timeout);

        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a safe request, retrying transient failures
    ///
    /// Returns the last response even when it is not a success so callers
    /// can interpret statuses like 404.
    async fn send_idempotent<F>(&self, what: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut retries = 0;
        let mut backoff = self.retry.initial_backoff;

        loop {
            debug!("{} (attempt {})", what, retries + 1);

            let wait = match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    let transient = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();

                    if !transient || retries >= self.retry.max_retries {
                        return Ok(response);
                    }

                    // Parse retry-after header if present, otherwise use exponential backoff
                    let wait = response
                        .headers()
                        .get(reqwest::header::RETRY_AFTER)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|s| s.parse::<u64>().ok())
                        .map(Duration::from_secs)
                        .unwrap_or(backoff);

                    warn!(
                        "{} returned {}. Waiting {:?} before retry {}/{}",
                        what,
                        status,
                        wait,
                        retries + 1,
                        self.retry.max_retries
                    );
                    wait
                }
                Err(e) => {
                    if retries >= self.retry.max_retries {
                        return Err(MetamorphError::Http(format!("{} failed: {}", what, e)));
                    }

                    warn!(
                        "{} failed: {}. Waiting {:?} before retry {}/{}",
                        what,
                        e,
                        backoff,
                        retries + 1,
                        self.retry.max_retries
                    );
                    backoff
                }
            };

            retries += 1;
            tokio::time::sleep(wait).await;
            backoff = (backoff * 2).min(self.retry.max_backoff);
        }
    }

    /// Send a request exactly once
    async fn send_once(&self, what: &str, builder: RequestBuilder) -> Result<Response> {
        debug!("{}", what);
        builder
            .send()
            .await
            .map_err(|e| MetamorphError::Http(format!("{} failed: {}", what, e)))
    }
}

/// Turn a non-success response into `Upstream`, keeping the body verbatim
async fn upstream_error(response: Response) -> MetamorphError {
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown".to_string());
    MetamorphError::Upstream { status, body }
}

async fn parse_json<T: serde::de::DeserializeOwned>(what: &str, response: Response) -> Result<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|e| MetamorphError::Http(format!("{}: failed to read body: {}", what, e)))?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl HostingApi for GitHubClient {
    async fn download_archive(
        &self,
        repo: &RepoId,
        reference: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>> {
        let url = self.repo_url(repo, std::iter::once("zipball").chain(reference.split('/')))?;
        info!("Downloading archive of {}@{}", repo, reference);

        let response = self
            .send_idempotent("archive download", || {
                self.request(Method::GET, url.clone(), token)
                    .timeout(self.archive_timeout)
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Archive download for {} returned {}", repo, status);
            return Err(MetamorphError::DownloadFailed {
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| MetamorphError::Http(format!("Failed to read archive body: {}", e)))?;

        info!("Downloaded {} bytes for {}", bytes.len(), repo);
        Ok(bytes.to_vec())
    }

    async fn branch_head(&self, repo: &RepoId, branch: &str, token: &str) -> Result<String> {
        let url = self.repo_url(
            repo,
            ["git", "refs", "heads"].into_iter().chain(branch.split('/')),
        )?;

        let response = self
            .send_idempotent("reference lookup", || {
                self.request(Method::GET, url.clone(), Some(token))
            })
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let parsed: RefResponse = parse_json("reference lookup", response).await?;
        debug!("{}@{} is at {}", repo, branch, parsed.object.sha);
        Ok(parsed.object.sha)
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
        token: &str,
    ) -> Result<()> {
        let url = self.repo_url(repo, ["git", "refs"])?;
        let body = CreateRefRequest {
            reference: format!("refs/heads/{}", branch),
            sha,
        };

        let response = self
            .send_once(
                "reference creation",
                self.request(Method::POST, url, Some(token)).json(&body),
            )
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        info!("Created branch {} on {} at {}", branch, repo, sha);
        Ok(())
    }

    async fn file_sha(
        &self,
        repo: &RepoId,
        path: &str,
        reference: &str,
        token: &str,
    ) -> Result<Option<String>> {
        let mut url = self.repo_url(repo, std::iter::once("contents").chain(path.split('/')))?;
        url.query_pairs_mut().append_pair("ref", reference);

        let response = self
            .send_idempotent("content lookup", || {
                self.request(Method::GET, url.clone(), Some(token))
            })
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let parsed: ContentResponse = parse_json("content lookup", response).await?;
        Ok(Some(parsed.sha))
    }

    async fn put_file(
        &self,
        repo: &RepoId,
        path: &str,
        request: &PutFileRequest,
        token: &str,
    ) -> Result<()> {
        let url = self.repo_url(repo, std::iter::once("contents").chain(path.split('/')))?;

        let response = self
            .send_once(
                "content upload",
                self.request(Method::PUT, url, Some(token)).json(request),
            )
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        debug!("Uploaded {} to {}", path, request.branch);
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoId,
        request: &NewPullRequest,
        token: &str,
    ) -> Result<PullRequest> {
        let url = self.repo_url(repo, ["pulls"])?;

        let response = self
            .send_once(
                "pull request creation",
                self.request(Method::POST, url, Some(token)).json(request),
            )
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let pull: PullRequest = parse_json("pull request creation", response).await?;
        info!("Opened pull request #{} on {}", pull.number, repo);
        Ok(pull)
    }
}
