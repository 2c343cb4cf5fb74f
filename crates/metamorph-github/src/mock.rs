//! In-memory hosting platform for tests

use crate::api::HostingApi;
use crate::types::{NewPullRequest, PullRequest, PutFileRequest};
use async_trait::async_trait;
use metamorph_core::{MetamorphError, RepoId, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug)]
struct MockState {
    archive: std::result::Result<Vec<u8>, u16>,
    base_sha: String,
    existing_files: HashMap<String, String>,
    failing_uploads: HashSet<String>,
    failing_lookups: HashSet<String>,
    branch_failure: Option<(u16, String)>,
    pull_failure: Option<(u16, String)>,
    branches: Vec<(String, String)>,
    uploads: Vec<(String, PutFileRequest)>,
    pulls: Vec<NewPullRequest>,
    calls: Vec<String>,
}

/// Mock hosting platform with canned answers and a call log
///
/// By default the archive download answers 404; set one with
/// [`MockHosting::with_archive`].
#[derive(Debug)]
pub struct MockHosting {
    state: Mutex<MockState>,
}

impl Default for MockHosting {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHosting {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                archive: Err(404),
                base_sha: "0000000000000000000000000000000000000000".to_string(),
                existing_files: HashMap::new(),
                failing_uploads: HashSet::new(),
                failing_lookups: HashSet::new(),
                branch_failure: None,
                pull_failure: None,
                branches: Vec::new(),
                uploads: Vec::new(),
                pulls: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A panicking test thread must not hide the log from the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Serve `bytes` as the repository archive
    pub fn with_archive(self, bytes: Vec<u8>) -> Self {
        self.lock().archive = Ok(bytes);
        self
    }

    /// Answer archive downloads with `status`
    pub fn with_archive_status(self, status: u16) -> Self {
        self.lock().archive = Err(status);
        self
    }

    pub fn with_base_sha(self, sha: impl Into<String>) -> Self {
        self.lock().base_sha = sha.into();
        self
    }

    /// Pretend `path` exists on the base branch with blob hash `sha`
    pub fn with_existing_file(self, path: impl Into<String>, sha: impl Into<String>) -> Self {
        self.lock().existing_files.insert(path.into(), sha.into());
        self
    }

    /// Reject uploads of `path` with 422
    pub fn failing_upload(self, path: impl Into<String>) -> Self {
        self.lock().failing_uploads.insert(path.into());
        self
    }

    /// Answer content lookups of `path` with 500
    pub fn failing_lookup(self, path: impl Into<String>) -> Self {
        self.lock().failing_lookups.insert(path.into());
        self
    }

    pub fn failing_branch(self, status: u16, body: impl Into<String>) -> Self {
        self.lock().branch_failure = Some((status, body.into()));
        self
    }

    pub fn failing_pull(self, status: u16, body: impl Into<String>) -> Self {
        self.lock().pull_failure = Some((status, body.into()));
        self
    }

    /// Branches created so far, with the hash they point at
    pub fn branches(&self) -> Vec<(String, String)> {
        self.lock().branches.clone()
    }

    /// Successful uploads so far, in call order
    pub fn uploads(&self) -> Vec<(String, PutFileRequest)> {
        self.lock().uploads.clone()
    }

    /// Pull requests opened so far
    pub fn pull_requests(&self) -> Vec<NewPullRequest> {
        self.lock().pulls.clone()
    }

    /// Every call made, as `<method> <detail>`
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Whether any publication call (anything but the download) was made
    pub fn publication_attempted(&self) -> bool {
        self.lock()
            .calls
            .iter()
            .any(|c| !c.starts_with("download_archive"))
    }
}

#[async_trait]
impl HostingApi for MockHosting {
    async fn download_archive(
        &self,
        repo: &RepoId,
        reference: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>> {
        let mut state = self.lock();
        state.calls.push(format!(
            "download_archive {}@{} auth={}",
            repo,
            reference,
            token.is_some()
        ));
        match &state.archive {
            Ok(bytes) => Ok(bytes.clone()),
            Err(status) => Err(MetamorphError::DownloadFailed { status: *status }),
        }
    }

    async fn branch_head(&self, repo: &RepoId, branch: &str, _token: &str) -> Result<String> {
        let mut state = self.lock();
        state.calls.push(format!("branch_head {}@{}", repo, branch));
        Ok(state.base_sha.clone())
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
        _token: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("create_branch {} {}", repo, branch));

        if let Some((status, body)) = &state.branch_failure {
            return Err(MetamorphError::Upstream {
                status: *status,
                body: body.clone(),
            });
        }
        if state.branches.iter().any(|(b, _)| b == branch) {
            return Err(MetamorphError::Upstream {
                status: 422,
                body: r#"{"message":"Reference already exists"}"#.to_string(),
            });
        }

        state.branches.push((branch.to_string(), sha.to_string()));
        Ok(())
    }

    async fn file_sha(
        &self,
        repo: &RepoId,
        path: &str,
        reference: &str,
        _token: &str,
    ) -> Result<Option<String>> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("file_sha {} {}@{}", repo, path, reference));

        if state.failing_lookups.contains(path) {
            return Err(MetamorphError::Upstream {
                status: 500,
                body: r#"{"message":"Server Error"}"#.to_string(),
            });
        }
        Ok(state.existing_files.get(path).cloned())
    }

    async fn put_file(
        &self,
        repo: &RepoId,
        path: &str,
        request: &PutFileRequest,
        _token: &str,
    ) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(format!("put_file {} {}", repo, path));

        if state.failing_uploads.contains(path) {
            return Err(MetamorphError::Upstream {
                status: 422,
                body: r#"{"message":"Invalid request"}"#.to_string(),
            });
        }

        state.uploads.push((path.to_string(), request.clone()));
        Ok(())
    }

    async fn create_pull_request(
        &self,
        repo: &RepoId,
        request: &NewPullRequest,
        _token: &str,
    ) -> Result<PullRequest> {
        let mut state = self.lock();
        state
            .calls
            .push(format!("create_pull_request {} {}", repo, request.head));

        if let Some((status, body)) = &state.pull_failure {
            return Err(MetamorphError::Upstream {
                status: *status,
                body: body.clone(),
            });
        }

        state.pulls.push(request.clone());
        let number = state.pulls.len() as u64;
        Ok(PullRequest {
            html_url: format!("https://github.com/{}/pull/{}", repo, number),
            number,
        })
    }
}
