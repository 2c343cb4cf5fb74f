//! Unified error types for MetaMorph

use thiserror::Error;

/// Unified error type for all MetaMorph operations
#[derive(Error, Debug)]
pub enum MetamorphError {
    // Request errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authorization error: {0}")]
    Authorization(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // Snapshot errors
    #[error("Failed to download repository: {status}")]
    DownloadFailed { status: u16 },

    #[error("Malformed archive: {0}")]
    MalformedArchive(String),

    // Agent errors
    #[error("Agent timed out after {secs} seconds")]
    AgentTimeout { secs: u64 },

    #[error("Agent error: {0}")]
    Agent(String),

    // Hosting platform errors
    #[error("Publication failed: {0}")]
    Publication(String),

    #[error("Upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("HTTP error: {0}")]
    Http(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic
    #[error("{0}")]
    Other(String),
}

impl MetamorphError {
    /// HTTP status code this error is surfaced as at the service boundary
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authorization(_) => 401,
            Self::InvalidRequest(_) | Self::DownloadFailed { .. } => 400,
            Self::AgentTimeout { .. } => 408,
            _ => 500,
        }
    }

    /// Stable machine-readable name for the error class
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Authorization(_) => "authorization_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::DownloadFailed { .. } => "download_failed",
            Self::MalformedArchive(_) => "malformed_archive",
            Self::AgentTimeout { .. } => "agent_timeout",
            Self::Agent(_) => "agent_error",
            Self::Publication(_) => "publication_error",
            Self::Upstream { .. } => "upstream_error",
            Self::Http(_) => "http_error",
            Self::Io(_) => "io_error",
            Self::Serialization(_) => "serialization_error",
            Self::Other(_) => "internal_error",
        }
    }

    /// Whether a read request that failed with this error may be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Result type alias using MetamorphError
pub type Result<T> = std::result::Result<T, MetamorphError>;
