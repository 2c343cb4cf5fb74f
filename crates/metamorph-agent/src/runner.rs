//! Agent runner capability

use async_trait::async_trait;
use metamorph_core::Result;
use std::path::Path;
use std::time::Duration;

/// Captured result of one agent run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentRun {
    /// Process exit code, when the agent exited normally
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Trait for running the modification agent (allows mocking in tests)
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Check that the runner can be invoked at all (credentials, binary path)
    ///
    /// Called before any download so misconfiguration fails fast.
    fn check_ready(&self) -> Result<()> {
        Ok(())
    }

    /// Run the agent in `working_dir` until it exits or `timeout` elapses
    ///
    /// Exceeding the timeout is `MetamorphError::AgentTimeout`.
    async fn run(&self, working_dir: &Path, mission: &str, timeout: Duration) -> Result<AgentRun>;
}
