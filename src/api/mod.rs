//! HTTP API for the reward core
//!
//! Exposed to collaborators:
//! - `POST /checkins` - submit a check-in attempt, returns verification +
//!   granted rewards + updated stats
//! - `GET /users/{id}/stats` - stats, category progress, leaderboard position
//! - `GET /leaderboard` - top-N by XP
//! - `POST /admin/reconcile?user_id=` - backfill repair for one user
//! - `POST /admin/tasks`, `POST /admin/rewards` - catalog seeding
//! - `GET /health`, `GET /stats` - liveness and table counts

pub mod routes;

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::engine::Engine;
use crate::error::CoreError;

pub type SharedEngine = Arc<Engine>;

/// Create the API router
pub fn create_router(engine: SharedEngine) -> Router {
    Router::new()
        // Core pipeline
        .route("/checkins", post(routes::submit_checkin))
        // Read paths
        .route("/users/:id/stats", get(routes::user_stats))
        .route("/leaderboard", get(routes::leaderboard))
        // Admin surface
        .route("/admin/reconcile", post(routes::reconcile))
        .route("/admin/tasks", post(routes::seed_tasks))
        .route("/admin/rewards", post(routes::seed_rewards))
        // Diagnostics
        .route("/health", get(routes::health))
        .route("/stats", get(routes::db_stats))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

/// JSON error body. Verification failures carry the measured numbers so the
/// client can retry intelligently.
#[derive(serde::Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    accuracy_m: Option<f64>,
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            // Idempotency signals: the work is already done, tell the client
            // "already done" rather than failing
            CoreError::AlreadyCompleted { .. } | CoreError::AlreadyAwarded { .. } => {
                StatusCode::CONFLICT
            }
            CoreError::InvalidProof(_)
            | CoreError::InsufficientAccuracy { .. }
            | CoreError::OutOfRange { .. }
            | CoreError::TypeMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            // Transient and retry-safe
            CoreError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let (distance_m, accuracy_m) = match &self {
            CoreError::OutOfRange { distance_m, .. } => (Some(*distance_m), None),
            CoreError::InsufficientAccuracy { accuracy_m, .. } => (None, Some(*accuracy_m)),
            _ => (None, None),
        };

        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
                distance_m,
                accuracy_m,
            }),
        )
            .into_response()
    }
}
