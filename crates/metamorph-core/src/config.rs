//! Configuration management for MetaMorph
//!
//! Service-level settings: where to listen, how to talk to the hosting
//! platform, how to launch the agent, and where working areas live. Every
//! field has a default so a missing file means a fully working config.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{MetamorphError, Result};

/// Default config file name, looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "metamorph.toml";

/// Top-level service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetamorphConfig {
    /// Inbound HTTP listener
    #[serde(default)]
    pub server: ServerConfig,

    /// Hosting platform API
    #[serde(default)]
    pub github: GithubConfig,

    /// External agent process
    #[serde(default)]
    pub agent: AgentConfig,

    /// Working area placement
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

/// Hosting platform settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubConfig {
    /// REST API base URL
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Branch snapshots are taken from and pull requests target
    #[serde(default = "default_base_branch")]
    pub base_branch: String,

    /// Reject requests without an access token (401)
    #[serde(default)]
    pub require_token: bool,

    /// Per-call timeout for API requests
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for the archive download
    #[serde(default = "default_archive_timeout_secs")]
    pub archive_timeout_secs: u64,

    /// Retries for safe (read-only) calls
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First backoff delay; doubles on each retry
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

/// External agent settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Program to execute
    #[serde(default = "default_agent_program")]
    pub program: String,

    /// Arguments; `{mission}` is replaced with the mission text
    #[serde(default = "default_agent_args")]
    pub args: Vec<String>,

    /// Wall-clock budget for one run
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,

    /// Environment variable holding the agent API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Variable name the key is exported as to the agent process
    #[serde(default = "default_forward_key_as")]
    pub forward_key_as: String,

    /// Characters of agent output included in pull request bodies
    #[serde(default = "default_output_excerpt_chars")]
    pub output_excerpt_chars: usize,
}

/// Working area placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Parent directory for working areas (system temp dir when unset)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Directory name prefix
    #[serde(default = "default_workspace_prefix")]
    pub prefix: String,
}

// Default value providers
fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_base_branch() -> String {
    "main".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_archive_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_agent_program() -> String {
    "npx".to_string()
}

fn default_agent_args() -> Vec<String> {
    [
        "-y",
        "cline@latest",
        "--autonomous",
        "--task",
        "{mission}",
        "--max-iterations",
        "5",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_agent_timeout_secs() -> u64 {
    300
}

fn default_api_key_env() -> String {
    "METAMORPH_API_KEY".to_string()
}

fn default_forward_key_as() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_output_excerpt_chars() -> usize {
    500
}

fn default_workspace_prefix() -> String {
    "metamorph_".to_string()
}

impl MetamorphConfig {
    /// Load configuration from `path`, or defaults if the file does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config = toml::from_str(&content).map_err(|e| {
                MetamorphError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            })?;
            tracing::debug!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Write the default configuration to `path`
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(&Self::default()).map_err(|e| {
            MetamorphError::Configuration(format!("Failed to serialize config: {}", e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Socket address string for the listener
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            base_branch: default_base_branch(),
            require_token: false,
            request_timeout_secs: default_request_timeout_secs(),
            archive_timeout_secs: default_archive_timeout_secs(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_agent_program(),
            args: default_agent_args(),
            timeout_secs: default_agent_timeout_secs(),
            api_key_env: default_api_key_env(),
            forward_key_as: default_forward_key_as(),
            output_excerpt_chars: default_output_excerpt_chars(),
        }
    }
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            prefix: default_workspace_prefix(),
        }
    }
}
