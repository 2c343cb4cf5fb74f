//! Hosting platform abstraction

use crate::types::{NewPullRequest, PullRequest, PutFileRequest};
use async_trait::async_trait;
use metamorph_core::{RepoId, Result};

/// Trait for hosting platform calls (allows mocking in tests)
///
/// Non-2xx answers surface as `MetamorphError::Upstream` unless a method
/// documents otherwise.
#[async_trait]
pub trait HostingApi: Send + Sync {
    /// Download a zip archive of `reference`
    ///
    /// A non-2xx answer is `MetamorphError::DownloadFailed` with the status.
    async fn download_archive(
        &self,
        repo: &RepoId,
        reference: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>>;

    /// Commit hash the branch currently points at
    async fn branch_head(&self, repo: &RepoId, branch: &str, token: &str) -> Result<String>;

    /// Create `refs/heads/<branch>` pointing at `sha`
    async fn create_branch(&self, repo: &RepoId, branch: &str, sha: &str, token: &str)
        -> Result<()>;

    /// Blob hash of `path` at `reference`, or `None` if the file does not exist
    async fn file_sha(
        &self,
        repo: &RepoId,
        path: &str,
        reference: &str,
        token: &str,
    ) -> Result<Option<String>>;

    /// Create or update `path` on the branch named in `request`
    async fn put_file(
        &self,
        repo: &RepoId,
        path: &str,
        request: &PutFileRequest,
        token: &str,
    ) -> Result<()>;

    /// Open a pull request
    async fn create_pull_request(
        &self,
        repo: &RepoId,
        request: &NewPullRequest,
        token: &str,
    ) -> Result<PullRequest>;
}
