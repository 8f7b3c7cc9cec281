//! HTTP surface of the action agent
//!
//! - `GET /health`
//! - `POST /actions` accepts an [`ActionItem`] and executes it in the background
//! - `GET /actions/{uid}` reports what the registry knows about an action

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{error, info, Level};

use crate::action::{ActionItem, Claim};
use crate::error::ExecutorError;
use crate::scaler::HorizontalScaler;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct AppState {
    pub scaler: Arc<HorizontalScaler>,
}

impl AppState {
    #[must_use]
    pub fn new(scaler: Arc<HorizontalScaler>) -> Self {
        Self { scaler }
    }
}

/// Routes and middleware of the agent
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/actions", post(submit_action))
        .route("/actions/{uid}", get(action_status))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "service": "action-agent",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Accept an action and execute it in the background.
///
/// `202` when accepted, `200` with the recorded action when the UID already executed,
/// `409` when the UID is still in flight.
async fn submit_action(State(state): State<AppState>, Json(item): Json<ActionItem>) -> Response {
    match state.scaler.registry().claim(&item.uid) {
        Ok(Claim::Fresh) => {
            let uid = item.uid.clone();
            let scaler = Arc::clone(&state.scaler);
            tokio::spawn(async move {
                if let Err(e) = scaler.run_claimed(&item).await {
                    error!(action_uid = %item.uid, error = %e, "Action execution failed");
                }
            });
            info!(action_uid = %uid, "Accepted action");
            (
                StatusCode::ACCEPTED,
                Json(json!({ "uid": uid, "status": "accepted" })),
            )
                .into_response()
        }
        Ok(Claim::Executed(action)) => (StatusCode::OK, Json(action)).into_response(),
        Err(e @ ExecutorError::DuplicateAction { .. }) => (
            StatusCode::CONFLICT,
            Json(json!({ "uid": item.uid, "error": e.to_string() })),
        )
            .into_response(),
        Err(e) => {
            error!(action_uid = %item.uid, error = %e, "Failed to claim action");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "uid": item.uid, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn action_status(State(state): State<AppState>, Path(uid): Path<String>) -> Response {
    match state.scaler.registry().get(&uid) {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "uid": uid, "error": "unknown action" })),
        )
            .into_response(),
    }
}
