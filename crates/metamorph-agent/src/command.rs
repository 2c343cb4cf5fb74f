//! Process-backed agent runner

use crate::auth::resolve_api_key;
use crate::runner::{AgentRun, AgentRunner};
use async_trait::async_trait;
use metamorph_core::{AgentConfig, MetamorphError, Result};
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

const MISSION_PLACEHOLDER: &str = "{mission}";

/// Runs the agent as a child process in the working directory
///
/// Arguments are passed without a shell; `{mission}` in any argument is
/// replaced with the mission text.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    missing_key: Option<String>,
}

impl CommandAgent {
    /// Create a runner for `program` with argument template `args`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
            missing_key: None,
        }
    }

    /// Build from config, resolving the API key from the environment now
    ///
    /// A missing key does not fail construction; it makes every run fail
    /// with a configuration error from [`AgentRunner::check_ready`].
    pub fn from_config(config: &AgentConfig) -> Self {
        let agent = Self::new(config.program.clone(), config.args.clone());

        match resolve_api_key(&config.api_key_env) {
            Ok(key) => agent.with_env(config.forward_key_as.clone(), key),
            Err(_) => {
                warn!(
                    "{} is not set; healing requests will be rejected",
                    config.api_key_env
                );
                Self {
                    missing_key: Some(config.api_key_env.clone()),
                    ..agent
                }
            }
        }
    }

    /// Add an environment variable for the child process
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn render_args(&self, mission: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(MISSION_PLACEHOLDER, mission))
            .collect()
    }
}

#[async_trait]
impl AgentRunner for CommandAgent {
    fn check_ready(&self) -> Result<()> {
        match &self.missing_key {
            Some(var) => Err(MetamorphError::Configuration(format!("{} not configured", var))),
            None => Ok(()),
        }
    }

    #[instrument(skip(self, mission), fields(program = %self.program, dir = %working_dir.display()))]
    async fn run(&self, working_dir: &Path, mission: &str, timeout: Duration) -> Result<AgentRun> {
        self.check_ready()?;

        info!("Launching agent with {}s budget", timeout.as_secs());
        let started = Instant::now();

        let mut cmd = Command::new(&self.program);
        cmd.args(self.render_args(mission))
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group, so launchers like npx take their children down with them
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|e| {
            MetamorphError::Agent(format!("Failed to spawn {}: {}", self.program, e))
        })?;
        let pid = child.id();

        let waited = tokio::time::timeout(timeout, child.wait_with_output()).await;

        // Anything the agent left running must not outlive the working area
        if let Some(pid) = pid {
            kill_process_group(pid);
        }

        let output = match waited {
            Ok(result) => result
                .map_err(|e| MetamorphError::Agent(format!("Failed to wait for agent: {}", e)))?,
            Err(_) => {
                warn!("Agent exceeded {}s budget, killed", timeout.as_secs());
                return Err(MetamorphError::AgentTimeout {
                    secs: timeout.as_secs(),
                });
            }
        };

        let run = AgentRun {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            elapsed: started.elapsed(),
        };

        info!(
            "Agent finished in {:.1}s with exit code {:?}",
            run.elapsed.as_secs_f64(),
            run.exit_code
        );
        debug!("Agent stdout: {}", run.stdout);
        if !run.stderr.is_empty() {
            debug!("Agent stderr: {}", run.stderr);
        }

        Ok(run)
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    if pgid == 0 {
        return;
    }
    let res = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if res != 0 {
        let err = std::io::Error::last_os_error();
        // ESRCH: the group already exited
        if !matches!(err.raw_os_error(), Some(code) if code == libc::ESRCH || code == libc::EPERM) {
            warn!("Failed to kill agent process group {}: {}", pgid, err);
        }
    } else {
        debug!("Killed agent process group {}", pgid);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
