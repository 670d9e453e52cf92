//! HTTP control surface: start a run, poll status, follow the live event
//! stream, verify Prism Central connectivity, and manage the persisted
//! deployment configuration.

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::stream::{Stream, unfold};
use serde::Deserialize;
use serde_json::json;

use crate::catalog::Mode;
use crate::config::{ConfigDoc, ConfigStore, REDACTION_MARKER};
use crate::errors::StartError;
use crate::inventory::{PrismClient, PrismCredentials};
use crate::orchestrator::Orchestrator;

/// Poll interval for the live stream. Each expiry re-checks whether the run
/// is still active before waiting again.
const STREAM_POLL: Duration = Duration::from_secs(1);

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: ConfigStore,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct RunRequest {
    pub mode: Mode,
    pub phases: Option<Vec<String>>,
    pub secret: Option<String>,
    pub config: Option<ConfigDoc>,
}

#[derive(Deserialize)]
pub struct VerifyRequest {
    #[serde(default)]
    pub pc_ip: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub verify_ssl: bool,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({"error": message}))).into_response()
    }
}

impl From<StartError> for ApiError {
    fn from(err: StartError) -> Self {
        match err {
            StartError::AlreadyRunning => ApiError::Conflict(err.to_string()),
            StartError::UnknownPhase(_) => ApiError::BadRequest(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/run", post(start_run))
        .route("/api/status", get(run_status))
        .route("/api/stream", get(event_stream))
        .route("/api/verify", post(verify_connection))
        .route("/api/save-config", post(save_config))
        .route("/api/download-config", get(download_config))
        .route("/api/upload-config", post(upload_config))
        .route("/health", get(health))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health() -> &'static str {
    "ok"
}

/// Start a deployment run.
///
/// An inline config is persisted (redacted) before anything else, so the
/// scripts see it even when the start is later rejected. The secret comes
/// from the request when present; a non-redacted stored value is the
/// fallback. The persisted artifacts only ever hold the redaction marker,
/// so a request-supplied secret is the common path.
async fn start_run(
    State(state): State<SharedState>,
    Json(body): Json<RunRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if let Some(config) = &body.config {
        state.config.persist(config)?;
    }

    let secret = body
        .secret
        .filter(|s| !s.is_empty() && s != REDACTION_MARKER);
    let secret = match secret {
        Some(value) => value,
        None => state.config.stored_secret()?.ok_or_else(|| {
            ApiError::BadRequest("a Prism Central password is required to start a run".into())
        })?,
    };

    let receipt = state
        .orchestrator
        .start(body.mode, body.phases.as_deref(), Some(secret))?;
    Ok(Json(json!({
        "success": true,
        "mode": receipt.mode,
        "phases": receipt.phases,
    })))
}

async fn run_status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.orchestrator.snapshot())
}

/// Live event stream. One SSE data frame per bus event; the stream ends
/// once the run is inactive and every pending event has been delivered.
async fn event_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let orchestrator = Arc::clone(&state.orchestrator);
    let tap = state.orchestrator.subscribe();

    let stream = unfold(tap, move |mut tap| {
        let orchestrator = Arc::clone(&orchestrator);
        async move {
            let event = tap
                .next_before_idle(STREAM_POLL, || !orchestrator.is_active())
                .await?;
            let data = serde_json::to_string(&event).unwrap_or_default();
            Some((Ok(SseEvent::default().data(data)), tap))
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Probe Prism Central with the supplied credentials and return the
/// discovered inventory. Upstream failures surface as an opaque message
/// with a gateway status; credentials never appear in the response.
async fn verify_connection(
    Json(body): Json<VerifyRequest>,
) -> Result<Response, ApiError> {
    let host = body.pc_ip.trim().to_string();
    let username = body.username.trim().to_string();
    let password = body.password.trim().to_string();
    if host.is_empty() || username.is_empty() || password.is_empty() {
        return Err(ApiError::BadRequest(
            "Prism Central IP, username, and password are required".into(),
        ));
    }

    let client = PrismClient::new(PrismCredentials {
        host,
        username,
        password,
        verify_ssl: body.verify_ssl,
    })
    .map_err(|e| ApiError::Internal(e.to_string()))?;

    match client.gather_inventory().await {
        Ok(inventory) => {
            Ok(Json(json!({"success": true, "inventory": inventory})).into_response())
        }
        Err(err) => Ok((
            StatusCode::BAD_GATEWAY,
            Json(json!({"success": false, "error": err.to_string()})),
        )
            .into_response()),
    }
}

async fn save_config(
    State(state): State<SharedState>,
    Json(body): Json<ConfigDoc>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.config.persist(&body)?;
    Ok(Json(json!({"success": true})))
}

async fn download_config(State(state): State<SharedState>) -> Result<Response, ApiError> {
    let text = state.config.env_text()?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"environment.env\"",
            ),
        ],
        text,
    )
        .into_response())
}

/// Accepts either a JSON document or env-file text as the raw body.
async fn upload_config(
    State(state): State<SharedState>,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("no configuration provided".into()));
    }
    let parsed = crate::config::parse_flexible(&body);
    state.config.persist(&parsed)?;
    let current = state.config.load()?;
    Ok(Json(json!({"success": true, "config": current})))
}
