//! # metamorph-core
//!
//! Core types for the MetaMorph healing service.
//!
//! A healing run takes a repository and a mission, lets an external agent
//! edit a snapshot of the repository, and publishes whatever changed as a
//! branch plus pull request. This crate holds the vocabulary shared by every
//! stage of that pipeline:
//!
//! - Requests and repository identifiers
//! - File snapshots and change sets
//! - Publication reports
//! - The unified error type and service configuration

mod config;
mod error;
mod types;

pub use config::{
    AgentConfig, GithubConfig, MetamorphConfig, ServerConfig, WorkspaceConfig, CONFIG_FILE_NAME,
};
pub use error::{MetamorphError, Result};
pub use types::*;
