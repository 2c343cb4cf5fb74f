//! Fire-and-forget notifications
//!
//! Two outbound hooks: a status update posted to the dashboard, and a
//! repository-dispatch event that kicks off downstream automation. Targets and
//! tokens are read from the environment on every call. Nothing is retried and
//! failures only produce a log line. Short-lived callers use
//! [`Notifier::flush`] to give sends in flight a bounded chance to land.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Dashboard webhook URL
pub const DASHBOARD_URL_ENV: &str = "METAMORPH_DASHBOARD_URL";
/// Repository-dispatch endpoint URL
pub const DISPATCH_URL_ENV: &str = "METAMORPH_DISPATCH_URL";
/// Bearer token for the dispatch endpoint
pub const DISPATCH_TOKEN_ENV: &str = "METAMORPH_DISPATCH_TOKEN";

const DISPATCH_EVENT_TYPE: &str = "deploy-agent";
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Payload posted to the dashboard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: String,
}

/// Repository-dispatch event body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub event_type: String,
    pub client_payload: DispatchPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchPayload {
    pub mission: String,
    pub original_error: String,
    pub timestamp: String,
}

impl DispatchEvent {
    pub fn new(mission: impl Into<String>, original_error: impl Into<String>) -> Self {
        Self {
            event_type: DISPATCH_EVENT_TYPE.to_string(),
            client_payload: DispatchPayload {
                mission: mission.into(),
                original_error: original_error.into(),
                timestamp: Utc::now().to_rfc3339(),
            },
        }
    }
}

/// Sends webhook notifications in the background
#[derive(Debug, Clone)]
pub struct Notifier {
    http: Option<reqwest::Client>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Notifier {
    /// Notifier that posts to whatever the environment names at call time
    pub fn from_env() -> Self {
        Self {
            http: Some(reqwest::Client::new()),
            pending: Arc::default(),
        }
    }

    /// Notifier that never sends anything
    pub fn disabled() -> Self {
        Self {
            http: None,
            pending: Arc::default(),
        }
    }

    /// Post a status update to the dashboard
    ///
    /// Returns `false` when disabled or unconfigured.
    pub fn status(&self, status: &str, message: &str, kind: &str) -> bool {
        let Some(http) = self.http.clone() else {
            return false;
        };
        let Some(url) = env_var(DASHBOARD_URL_ENV) else {
            return false;
        };

        let update = StatusUpdate {
            status: status.to_string(),
            message: message.to_string(),
            kind: kind.to_string(),
            timestamp: Utc::now().to_rfc3339(),
        };

        debug!("Posting {} status to dashboard", update.status);
        self.track(tokio::spawn(async move {
            send(http.post(&url).json(&update), "dashboard status").await;
        }));
        true
    }

    /// Fire a repository-dispatch event for downstream automation
    ///
    /// Returns `false` when disabled or unconfigured.
    pub fn dispatch(&self, event: DispatchEvent) -> bool {
        let Some(http) = self.http.clone() else {
            return false;
        };
        let Some(url) = env_var(DISPATCH_URL_ENV) else {
            return false;
        };

        let mut request = http
            .post(&url)
            .header(reqwest::header::ACCEPT, "application/vnd.github.v3+json")
            .header(
                reqwest::header::USER_AGENT,
                concat!("metamorph/", env!("CARGO_PKG_VERSION")),
            )
            .json(&event);
        if let Some(token) = env_var(DISPATCH_TOKEN_ENV) {
            request = request.bearer_auth(token);
        }

        info!("Dispatching {} event", event.event_type);
        self.track(tokio::spawn(async move {
            send(request, "repository dispatch").await;
        }));
        true
    }

    /// Wait for sends still in flight, giving up after `grace`
    ///
    /// Sends that outlive the grace period keep running in the background.
    pub async fn flush(&self, grace: Duration) {
        let pending = std::mem::take(&mut *self.lock_pending());
        if pending.is_empty() {
            return;
        }

        debug!("Waiting up to {:?} for {} notification(s)", grace, pending.len());
        let all = async {
            for task in pending {
                if let Err(e) = task.await {
                    warn!("Notification task aborted: {}", e);
                }
            }
        };
        if tokio::time::timeout(grace, all).await.is_err() {
            warn!("Notifications still in flight after {:?}", grace);
        }
    }

    fn track(&self, task: JoinHandle<()>) {
        let mut pending = self.lock_pending();
        pending.retain(|t| !t.is_finished());
        pending.push(task);
    }

    fn lock_pending(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

async fn send(request: reqwest::RequestBuilder, what: &str) {
    match request.timeout(NOTIFY_TIMEOUT).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("{} delivered ({})", what, response.status());
        }
        Ok(response) => warn!("{} rejected with {}", what, response.status()),
        Err(e) => warn!("{} failed: {}", what, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    // Mutex to prevent concurrent env var modifications
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    type Captured = Arc<Mutex<Vec<(Option<String>, serde_json::Value)>>>;

    async fn capture(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<serde_json::Value>,
    ) -> &'static str {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        captured.lock().unwrap().push((auth, body));
        "ok"
    }

    async fn start_sink() -> (String, Captured) {
        let captured = Captured::default();
        let app = Router::new()
            .route("/hook", post(capture))
            .with_state(captured.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/hook"), captured)
    }

    #[tokio::test]
    async fn test_disabled_sends_nothing() {
        let notifier = Notifier::disabled();
        assert!(!notifier.status("ANALYZING", "m", "info"));
        assert!(!notifier.dispatch(DispatchEvent::new("m", "e")));
        notifier.flush(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_unconfigured_env_sends_nothing() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        std::env::remove_var(DASHBOARD_URL_ENV);
        std::env::remove_var(DISPATCH_URL_ENV);

        let notifier = Notifier::from_env();
        assert!(!notifier.status("ANALYZING", "m", "info"));
        assert!(!notifier.dispatch(DispatchEvent::new("m", "e")));
    }

    #[tokio::test]
    async fn test_status_and_dispatch_payloads() {
        let (url, captured) = start_sink().await;

        let notifier = Notifier::from_env();
        {
            let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            std::env::set_var(DASHBOARD_URL_ENV, &url);
            std::env::set_var(DISPATCH_URL_ENV, &url);
            std::env::set_var(DISPATCH_TOKEN_ENV, "ghp_dispatch");

            assert!(notifier.status("ANALYZING", "Healing acme/widgets", "warning"));
            assert!(notifier.dispatch(DispatchEvent::new("fix null check", "NPE")));

            std::env::remove_var(DASHBOARD_URL_ENV);
            std::env::remove_var(DISPATCH_URL_ENV);
            std::env::remove_var(DISPATCH_TOKEN_ENV);
        }

        notifier.flush(Duration::from_secs(5)).await;

        let captured = captured.lock().unwrap().clone();
        assert_eq!(captured.len(), 2);

        let status = captured
            .iter()
            .find(|(_, body)| body.get("status").is_some())
            .unwrap();
        assert_eq!(status.0, None);
        assert_eq!(status.1["status"], "ANALYZING");
        assert_eq!(status.1["type"], "warning");
        assert_eq!(status.1["message"], "Healing acme/widgets");

        let dispatch = captured
            .iter()
            .find(|(_, body)| body.get("event_type").is_some())
            .unwrap();
        assert_eq!(dispatch.0.as_deref(), Some("Bearer ghp_dispatch"));
        assert_eq!(dispatch.1["event_type"], "deploy-agent");
        assert_eq!(dispatch.1["client_payload"]["mission"], "fix null check");
        assert_eq!(dispatch.1["client_payload"]["original_error"], "NPE");
    }

    #[tokio::test]
    async fn test_flush_gives_up_after_grace() {
        let app = Router::new().route(
            "/slow",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let notifier = Notifier::from_env();
        {
            let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
            std::env::set_var(DASHBOARD_URL_ENV, format!("http://{addr}/slow"));
            assert!(notifier.status("HEALED", "done", "success"));
            std::env::remove_var(DASHBOARD_URL_ENV);
        }

        let started = std::time::Instant::now();
        notifier.flush(Duration::from_millis(200)).await;
        assert!(started.elapsed() < Duration::from_secs(2));
    }
}
