//! Wire types for the hosting platform REST API

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

/// Body of a contents create-or-update call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PutFileRequest {
    pub message: String,
    /// Base64-encoded file content
    pub content: String,
    pub branch: String,
    /// Existing blob hash; required when updating, absent when creating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha: Option<String>,
}

impl PutFileRequest {
    /// Build a request from raw text, encoding it for the wire
    pub fn new(
        message: impl Into<String>,
        content: &str,
        branch: impl Into<String>,
        sha: Option<String>,
    ) -> Self {
        Self {
            message: message.into(),
            content: STANDARD.encode(content.as_bytes()),
            branch: branch.into(),
            sha,
        }
    }

    /// Decoded file text, if the content is valid base64 UTF-8
    pub fn decoded_content(&self) -> Option<String> {
        let bytes = STANDARD.decode(&self.content).ok()?;
        String::from_utf8(bytes).ok()
    }
}

/// Body of a pull request creation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPullRequest {
    pub title: String,
    pub body: String,
    pub head: String,
    pub base: String,
}

/// The parts of a created pull request we report back
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequest {
    pub html_url: String,
    pub number: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefResponse {
    pub object: RefObject,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefObject {
    pub sha: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateRefRequest<'a> {
    #[serde(rename = "ref")]
    pub reference: String,
    pub sha: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ContentResponse {
    pub sha: String,
}
