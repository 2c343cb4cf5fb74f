//! # metamorph-server
//!
//! Axum front end for the healing pipeline.
//!
//! Routes:
//! - `GET /` service banner
//! - `GET /health` liveness
//! - `POST /heal` run one healing request
//! - `POST /trigger` fire a repository-dispatch event

mod server;

pub use server::{router, serve, AppState, HealBody, SharedState, TriggerBody, ALLOWED_ORIGINS};
