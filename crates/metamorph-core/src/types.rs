//! Core type definitions for MetaMorph healing runs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{MetamorphError, Result};

/// Repository identifier in `owner/name` form
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoId {
    owner: String,
    name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl std::str::FromStr for RepoId {
    type Err = MetamorphError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.trim().split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(owner), Some(name), None) if is_name_segment(owner) && is_name_segment(name) => {
                Ok(Self::new(owner, name))
            }
            _ => Err(MetamorphError::InvalidRequest(format!(
                "Repository must be in owner/name form, got '{}'",
                s
            ))),
        }
    }
}

/// Owner and repository names: ASCII letters, digits, `.`, `_` and `-`,
/// and never a bare `.` or `..`
fn is_name_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

impl TryFrom<String> for RepoId {
    type Error = MetamorphError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RepoId> for String {
    fn from(value: RepoId) -> Self {
        value.to_string()
    }
}

/// A request to heal a repository
///
/// Immutable once validated. Without a token the run is a dry run: the agent
/// still executes and changes are detected, but nothing is published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealingRequest {
    pub repository: RepoId,
    pub mission: String,
    pub access_token: Option<String>,
}

impl HealingRequest {
    /// Build a request from raw inbound fields
    ///
    /// Empty tokens count as absent; an empty mission is rejected.
    pub fn parse(repository: &str, mission: &str, access_token: Option<String>) -> Result<Self> {
        let repository: RepoId = repository.parse()?;

        if mission.trim().is_empty() {
            return Err(MetamorphError::InvalidRequest(
                "Repository and mission are required".to_string(),
            ));
        }

        Ok(Self {
            repository,
            mission: mission.to_string(),
            access_token: access_token.filter(|t| !t.trim().is_empty()),
        })
    }

    pub fn token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }
}

/// One captured file: its text and the SHA-256 of that text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub content: String,
    pub digest: String,
}

/// Point-in-time map of relative path (forward slashes) to file text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    files: BTreeMap<String, SnapshotEntry>,
}

impl FileSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, entry: SnapshotEntry) {
        self.files.insert(path.into(), entry);
    }

    pub fn get(&self, path: &str) -> Option<&SnapshotEntry> {
        self.files.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SnapshotEntry)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// How a path differs from the "before" snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
        }
    }
}

/// New content for one changed path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileChange {
    pub kind: ChangeKind,
    pub content: String,
}

/// Added and modified files, keyed by relative path
///
/// Deletions are never represented here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: BTreeMap<String, FileChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, change: FileChange) {
        self.changes.insert(path.into(), change);
    }

    pub fn get(&self, path: &str) -> Option<&FileChange> {
        self.changes.get(path)
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changed paths in lexicographic order
    pub fn paths(&self) -> Vec<String> {
        self.changes.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FileChange)> {
        self.changes.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Result of pushing a single file to the new branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum UploadOutcome {
    Uploaded,
    Failed(String),
}

/// Per-file entry in the publication report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUpload {
    pub path: String,
    pub outcome: UploadOutcome,
}

impl FileUpload {
    pub fn is_uploaded(&self) -> bool {
        matches!(self.outcome, UploadOutcome::Uploaded)
    }
}

/// What the publisher produced on the hosting platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationResult {
    pub branch_name: String,
    pub pull_request_url: String,
    pub pull_request_number: u64,
    /// Every path the publisher attempted, whether or not its upload succeeded
    pub files_changed: Vec<String>,
    pub uploads: Vec<FileUpload>,
}

impl PublicationResult {
    /// Paths whose upload failed
    pub fn failed_uploads(&self) -> Vec<String> {
        self.uploads
            .iter()
            .filter(|u| !u.is_uploaded())
            .map(|u| u.path.clone())
            .collect()
    }
}
