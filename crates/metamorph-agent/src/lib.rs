//! # metamorph-agent
//!
//! The external code-modification agent, seen as a single capability:
//! given a working directory, a mission and a time budget, mutate files in
//! place and report what was printed.
//!
//! ## Key Pattern
//!
//! The pipeline only talks to [`AgentRunner`]. The agent's exit code is never
//! interpreted; success is judged later by whether any file changed.
//!
//! - [`CommandAgent`] launches a local process (cline by default)
//! - [`ScriptedAgent`] applies canned edits, for tests and dry runs

mod auth;
mod command;
mod runner;
mod scripted;

pub use auth::resolve_api_key;
pub use command::CommandAgent;
pub use runner::{AgentRun, AgentRunner};
pub use scripted::{AgentEdit, ScriptedAgent};
