//! Uniform response envelope for healing runs

use crate::pipeline::HealingOutcome;
use crate::publisher::truncate_chars;
use metamorph_core::MetamorphError;
use serde::{Deserialize, Serialize};

/// What callers of `/heal` (and the CLI) get back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealingResponse {
    pub success: bool,
    pub message: String,
    pub changes_made: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_uploads: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files_removed: Vec<String>,
    /// Excerpt of the agent's stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip)]
    status: u16,
}

impl HealingResponse {
    fn empty(success: bool, message: &str, status: u16) -> Self {
        Self {
            success,
            message: message.to_string(),
            changes_made: false,
            branch: None,
            pr_url: None,
            pr_number: None,
            files_changed: Vec::new(),
            failed_uploads: Vec::new(),
            files_removed: Vec::new(),
            output: None,
            error: None,
            error_kind: None,
            status,
        }
    }

    /// Envelope for a run that finished, with at most `excerpt_chars` of output
    pub fn from_outcome(outcome: &HealingOutcome, excerpt_chars: usize) -> Self {
        let excerpt = |stdout: &str| {
            let trimmed = truncate_chars(stdout, excerpt_chars);
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        };

        match outcome {
            HealingOutcome::NoChanges { agent, removed } => Self {
                files_removed: removed.clone(),
                output: excerpt(&agent.stdout),
                ..Self::empty(true, "No changes needed", 200)
            },
            HealingOutcome::ChangesDetected {
                changes,
                removed,
                agent,
            } => Self {
                changes_made: true,
                files_changed: changes.paths(),
                files_removed: removed.clone(),
                output: excerpt(&agent.stdout),
                ..Self::empty(
                    true,
                    "Healing complete (changes made but no token to create PR)",
                    200,
                )
            },
            HealingOutcome::Published {
                publication,
                removed,
                agent,
            } => Self {
                changes_made: true,
                branch: Some(publication.branch_name.clone()),
                pr_url: Some(publication.pull_request_url.clone()),
                pr_number: Some(publication.pull_request_number),
                files_changed: publication.files_changed.clone(),
                failed_uploads: publication.failed_uploads(),
                files_removed: removed.clone(),
                output: excerpt(&agent.stdout),
                ..Self::empty(true, "Healing complete, PR created", 200)
            },
        }
    }

    /// Envelope for a run that failed
    pub fn from_error(err: &MetamorphError) -> Self {
        Self {
            error: Some(err.to_string()),
            error_kind: Some(err.kind().to_string()),
            ..Self::empty(false, "Healing failed", err.status_code())
        }
    }

    /// HTTP status this envelope should be served with
    pub fn status(&self) -> u16 {
        self.status
    }
}
