//! Scripted agent for tests and dry runs

use crate::runner::{AgentRun, AgentRunner};
use async_trait::async_trait;
use metamorph_core::{MetamorphError, Result};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A single canned file operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEdit {
    Write { path: String, content: String },
    Remove { path: String },
}

/// Agent that applies a fixed list of edits
///
/// An optional delay simulates a slow agent; if it exceeds the run's timeout
/// the run fails with `AgentTimeout` and no edits are applied.
#[derive(Debug, Default)]
pub struct ScriptedAgent {
    edits: Vec<AgentEdit>,
    stdout: String,
    delay: Option<Duration>,
    runs: AtomicUsize,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `content` to `path` (relative to the working directory)
    pub fn write(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.edits.push(AgentEdit::Write {
            path: path.into(),
            content: content.into(),
        });
        self
    }

    /// Delete `path` (relative to the working directory)
    pub fn remove(mut self, path: impl Into<String>) -> Self {
        self.edits.push(AgentEdit::Remove { path: path.into() });
        self
    }

    pub fn with_stdout(mut self, stdout: impl Into<String>) -> Self {
        self.stdout = stdout.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// How many times `run` has been called
    pub fn run_count(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    async fn apply(&self, working_dir: &Path) -> Result<()> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        for edit in &self.edits {
            match edit {
                AgentEdit::Write { path, content } => {
                    let target = working_dir.join(path);
                    if let Some(parent) = target.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                    tokio::fs::write(&target, content).await?;
                }
                AgentEdit::Remove { path } => {
                    tokio::fs::remove_file(working_dir.join(path)).await?;
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AgentRunner for ScriptedAgent {
    async fn run(&self, working_dir: &Path, _mission: &str, timeout: Duration) -> Result<AgentRun> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.apply(working_dir)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(MetamorphError::AgentTimeout {
                    secs: timeout.as_secs(),
                })
            }
        }

        Ok(AgentRun {
            exit_code: Some(0),
            stdout: self.stdout.clone(),
            stderr: String::new(),
            elapsed: started.elapsed(),
        })
    }
}
