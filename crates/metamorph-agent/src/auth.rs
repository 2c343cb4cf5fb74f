//! API key resolution for the agent
//!
//! The key is read from the process environment once at startup and handed
//! to the agent process under whatever name it expects.

use metamorph_core::{MetamorphError, Result};
use std::env;

/// Read the agent API key from `var`
///
/// Unset or blank values are a configuration error.
pub fn resolve_api_key(var: &str) -> Result<String> {
    match env::var(var) {
        Ok(key) if !key.trim().is_empty() => {
            tracing::info!("Using agent API key from {}", var);
            Ok(key)
        }
        _ => Err(MetamorphError::Configuration(format!("{} not configured", var))),
    }
}
