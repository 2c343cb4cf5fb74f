//! # metamorph-github
//!
//! Client for the GitHub-compatible REST surface the healing pipeline needs:
//! archive download, reference lookup and creation, file content lookup and
//! create-or-update, and pull request creation.
//!
//! ## Key Pattern
//!
//! Everything goes through the [`HostingApi`] trait so the pipeline can run
//! against [`MockHosting`] in tests. The real [`GitHubClient`] puts an
//! explicit timeout on every call and retries only safe reads.

mod api;
mod client;
mod mock;
mod types;

pub use api::HostingApi;
pub use client::{GitHubClient, RetryPolicy};
pub use mock::MockHosting;
pub use types::{NewPullRequest, PullRequest, PutFileRequest};
