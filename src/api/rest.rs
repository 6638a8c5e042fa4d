// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// Read-only view over the latest dashboard snapshot plus a manual refresh
// trigger.  All endpoints live under `/api/v1/`.
//
// CORS is configured permissively so a local dashboard can poll the service.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::app_state::AppState;

// =============================================================================
// Router construction
// =============================================================================

/// Build the REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/snapshot", get(snapshot))
        .route("/api/v1/refresh", post(refresh))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    uptime_secs: u64,
    server_time: i64,
    last_refresh: Option<DateTime<Utc>>,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        uptime_secs: state.uptime_secs(),
        server_time: Utc::now().timestamp_millis(),
        last_refresh: state.snapshot().map(|s| s.generated_at),
    };
    Json(resp)
}

// =============================================================================
// Snapshot
// =============================================================================

async fn snapshot(State(state): State<Arc<AppState>>) -> Response {
    match state.snapshot() {
        Some(snap) => Json(snap.as_ref()).into_response(),
        None => {
            let body = serde_json::json!({
                "status": "warming_up",
                "message": "No snapshot published yet",
            });
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
    }
}

// =============================================================================
// Manual refresh
// =============================================================================

async fn refresh(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.request_refresh();
    info!("manual refresh requested via API");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "accepted" })),
    )
}
