//! Publication of a change set as a branch plus pull request

use metamorph_core::{
    ChangeSet, FileUpload, MetamorphError, PublicationResult, RepoId, Result, UploadOutcome,
};
use metamorph_github::{HostingApi, NewPullRequest, PutFileRequest};
use tracing::{debug, info, warn};

pub const PULL_REQUEST_TITLE: &str = "🤖 MetaMorph AI: Automated Code Fixes";

/// Pushes changed files to a fresh branch and opens a pull request
pub struct Publisher<'a> {
    hosting: &'a dyn HostingApi,
    base_branch: &'a str,
}

impl<'a> Publisher<'a> {
    pub fn new(hosting: &'a dyn HostingApi, base_branch: &'a str) -> Self {
        Self {
            hosting,
            base_branch,
        }
    }

    /// Publish `changes` on `branch`
    ///
    /// Reference lookup, branch creation and pull request creation are
    /// terminal on failure. A single file failing to upload is recorded in
    /// the report and the remaining files are still attempted.
    pub async fn publish(
        &self,
        repo: &RepoId,
        token: &str,
        branch: &str,
        changes: &ChangeSet,
        mission: &str,
        agent_output: &str,
    ) -> Result<PublicationResult> {
        let base_sha = self
            .hosting
            .branch_head(repo, self.base_branch, token)
            .await
            .map_err(|e| publication_error("resolve base branch", e))?;

        self.hosting
            .create_branch(repo, branch, &base_sha, token)
            .await
            .map_err(|e| publication_error("create branch", e))?;
        info!("Created {} from {}@{}", branch, self.base_branch, base_sha);

        let mut uploads = Vec::with_capacity(changes.len());
        for (path, change) in changes.iter() {
            let outcome = match self.upload(repo, token, branch, path, &change.content).await {
                Ok(()) => {
                    debug!("Uploaded {} ({})", path, change.kind);
                    UploadOutcome::Uploaded
                }
                Err(e) => {
                    warn!("Failed to upload {}: {}", path, e);
                    UploadOutcome::Failed(e.to_string())
                }
            };
            uploads.push(FileUpload {
                path: path.to_string(),
                outcome,
            });
        }

        let files_changed = changes.paths();
        let request = NewPullRequest {
            title: PULL_REQUEST_TITLE.to_string(),
            body: pull_request_body(mission, &files_changed, agent_output),
            head: branch.to_string(),
            base: self.base_branch.to_string(),
        };

        let pull = self
            .hosting
            .create_pull_request(repo, &request, token)
            .await
            .map_err(|e| publication_error("create pull request", e))?;
        info!("Pull request #{} opened: {}", pull.number, pull.html_url);

        Ok(PublicationResult {
            branch_name: branch.to_string(),
            pull_request_url: pull.html_url,
            pull_request_number: pull.number,
            files_changed,
            uploads,
        })
    }

    async fn upload(
        &self,
        repo: &RepoId,
        token: &str,
        branch: &str,
        path: &str,
        content: &str,
    ) -> Result<()> {
        let existing = self
            .hosting
            .file_sha(repo, path, self.base_branch, token)
            .await?;
        let request = PutFileRequest::new(
            format!("fix: Auto-heal {}", path),
            content,
            branch,
            existing,
        );
        self.hosting.put_file(repo, path, &request, token).await
    }
}

fn publication_error(step: &str, err: MetamorphError) -> MetamorphError {
    match err {
        MetamorphError::Upstream { status, body } => {
            MetamorphError::Publication(format!("Failed to {} ({}): {}", step, status, body))
        }
        other => MetamorphError::Publication(format!("Failed to {}: {}", step, other)),
    }
}

/// Markdown body of the healing pull request
pub fn pull_request_body(mission: &str, files: &[String], agent_output: &str) -> String {
    let mut body = String::from("## 🤖 Autonomous Code Healing\n\n");
    body.push_str("This PR was automatically generated by MetaMorph AI.\n\n");
    body.push_str(&format!("**Mission:** {}\n\n", mission));

    body.push_str("### Files Changed:\n");
    for file in files {
        body.push_str(&format!("- {}\n", file));
    }

    let output = agent_output.trim();
    if !output.is_empty() {
        body.push_str("\n### Agent Output:\n```\n");
        body.push_str(output);
        body.push_str("\n```\n");
    }

    body.push_str("\nPowered by MetaMorph AI 🛡️");
    body
}

/// First `max` characters of `s`, never splitting a character
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
