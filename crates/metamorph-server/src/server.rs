//! Axum web server for the healing service

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderValue, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use metamorph_core::{HealingRequest, MetamorphError};
use metamorph_orchestrator::{DispatchEvent, HealingPipeline, HealingResponse};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tracing::{error, info};

/// Browser origins allowed to call the service
pub const ALLOWED_ORIGINS: [&str; 2] = [
    "https://metamorph-ai-three.vercel.app",
    "http://localhost:3001",
];

/// Shared application state
pub struct AppState {
    pub pipeline: Arc<HealingPipeline>,
}

pub type SharedState = Arc<AppState>;

/// POST /heal body
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HealBody {
    #[serde(default)]
    pub repository: Option<String>,
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub github_token: Option<String>,
}

/// POST /trigger body
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TriggerBody {
    #[serde(default)]
    pub mission: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Build the router with CORS applied
pub fn router(state: SharedState) -> Router {
    let origins = ALLOWED_ORIGINS.map(HeaderValue::from_static);
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true);

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/heal", post(heal))
        .route("/trigger", post(trigger))
        .layer(cors)
        .with_state(state)
}

/// Serve until the process is stopped
pub async fn serve(state: SharedState, addr: &str) -> anyhow::Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("MetaMorph healing service listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

/// GET /
async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "MetaMorph AI Healing Service Running",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /health
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// POST /heal - runs the pipeline to completion
///
/// The run is spawned as its own task so a client hanging up does not cancel
/// it half way through publication.
async fn heal(
    State(app): State<SharedState>,
    body: Result<Json<HealBody>, JsonRejection>,
) -> (StatusCode, Json<HealingResponse>) {
    let request = match parse_heal(body) {
        Ok(request) => request,
        Err(e) => return respond(HealingResponse::from_error(&e)),
    };

    let pipeline = app.pipeline.clone();
    let task = tokio::spawn(async move { pipeline.heal_to_response(&request).await });

    let response = match task.await {
        Ok(response) => response,
        Err(e) => {
            error!("Healing task aborted: {}", e);
            HealingResponse::from_error(&MetamorphError::Other(format!(
                "Healing task aborted: {}",
                e
            )))
        }
    };
    respond(response)
}

fn parse_heal(body: Result<Json<HealBody>, JsonRejection>) -> metamorph_core::Result<HealingRequest> {
    let Json(body) = body.map_err(|e| MetamorphError::InvalidRequest(e.body_text()))?;

    match (body.repository.as_deref(), body.mission.as_deref()) {
        (Some(repository), Some(mission)) if !repository.trim().is_empty() => {
            HealingRequest::parse(repository, mission, body.github_token)
        }
        _ => Err(MetamorphError::InvalidRequest(
            "Repository and mission are required".to_string(),
        )),
    }
}

fn respond(response: HealingResponse) -> (StatusCode, Json<HealingResponse>) {
    let status =
        StatusCode::from_u16(response.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(response))
}

/// POST /trigger - fire-and-forget dispatch to downstream automation
async fn trigger(
    State(app): State<SharedState>,
    body: Result<Json<TriggerBody>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    let body = match body {
        Ok(Json(body)) => body,
        Err(e) => return trigger_error(e.body_text()),
    };
    let Some(mission) = body.mission.filter(|m| !m.trim().is_empty()) else {
        return trigger_error("Mission is required".to_string());
    };
    let original_error = body.error.unwrap_or_default();

    info!("Triggering healing workflow: {}", mission);
    let event = DispatchEvent::new(mission.clone(), original_error);
    let event_type = event.event_type.clone();

    let notifier = app.pipeline.notifier();
    notifier.dispatch(event);
    notifier.status("TRIGGERED", &format!("Healing triggered: {}", mission), "info");

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "message": "Healing workflow triggered",
            "event_type": event_type
        })),
    )
}

fn trigger_error(message: String) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({ "success": false, "error": message })),
    )
}
