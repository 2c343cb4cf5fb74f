//! # metamorph-orchestrator
//!
//! The healing pipeline and everything it coordinates.
//!
//! This crate provides:
//! - [`HealingPipeline`]: snapshot, agent run, change detection, publication
//! - [`Publisher`]: branch, per-file uploads and pull request
//! - [`BranchNamer`]: unique `metamorph-fixes-<millis>` branch names
//! - [`RepositoryLeases`]: per-repository mutual exclusion around publication
//! - [`Notifier`]: fire-and-forget dashboard and dispatch webhooks
//! - [`HealingResponse`]: the uniform result envelope

mod branch;
mod envelope;
mod lease;
mod notify;
mod pipeline;
mod publisher;

pub use branch::{BranchNamer, BRANCH_PREFIX};
pub use envelope::HealingResponse;
pub use lease::{RepositoryLease, RepositoryLeases};
pub use notify::{
    DispatchEvent, DispatchPayload, Notifier, StatusUpdate, DASHBOARD_URL_ENV, DISPATCH_TOKEN_ENV,
    DISPATCH_URL_ENV,
};
pub use pipeline::{HealingOutcome, HealingPipeline, PipelineConfig};
pub use publisher::{pull_request_body, truncate_chars, Publisher, PULL_REQUEST_TITLE};
