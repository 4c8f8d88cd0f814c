//! HTTP route handlers

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;

use super::SharedEngine;
use crate::db::rewards::CreateRewardInput;
use crate::db::tasks::{self, CreateTaskInput};
use crate::db::{rewards, DbStats};
use crate::engine::{CheckinOutcome, ReconcileReport, UserSnapshot};
use crate::error::CoreError;
use crate::model::Proof;

/// Body of `POST /checkins`. Exactly one proof form must be present:
/// a QR token, or a full GPS fix.
#[derive(Debug, Deserialize)]
pub struct CheckinRequest {
    pub user_id: String,
    pub task_id: String,
    #[serde(default)]
    pub qr_token: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
}

impl CheckinRequest {
    fn proof(&self) -> Result<Proof, CoreError> {
        match (self.qr_token.as_ref(), self.latitude, self.longitude, self.accuracy_m) {
            (Some(token), None, None, None) => Ok(Proof::Qr {
                token: token.clone(),
            }),
            (None, Some(latitude), Some(longitude), Some(accuracy_m)) => Ok(Proof::Gps {
                latitude,
                longitude,
                accuracy_m,
            }),
            _ => Err(CoreError::InvalidInput(
                "Provide either qr_token or latitude+longitude+accuracy_m".to_string(),
            )),
        }
    }
}

/// POST /checkins
pub async fn submit_checkin(
    State(engine): State<SharedEngine>,
    Json(req): Json<CheckinRequest>,
) -> Result<Json<CheckinOutcome>, CoreError> {
    if req.user_id.is_empty() || req.task_id.is_empty() {
        return Err(CoreError::InvalidInput(
            "user_id and task_id are required".to_string(),
        ));
    }

    let proof = req.proof()?;
    let outcome = engine.check_in(&req.user_id, &req.task_id, &proof)?;
    Ok(Json(outcome))
}

/// GET /users/{id}/stats
pub async fn user_stats(
    State(engine): State<SharedEngine>,
    Path(user_id): Path<String>,
) -> Result<Json<UserSnapshot>, CoreError> {
    Ok(Json(engine.user_snapshot(&user_id)?))
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(default = "default_leaderboard_limit")]
    pub limit: u32,
}

fn default_leaderboard_limit() -> u32 {
    10
}

/// GET /leaderboard
pub async fn leaderboard(
    State(engine): State<SharedEngine>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<impl IntoResponse, CoreError> {
    Ok(Json(engine.leaderboard(query.limit.min(100))?))
}

#[derive(Debug, Deserialize)]
pub struct ReconcileQuery {
    pub user_id: String,
}

/// POST /admin/reconcile?user_id=
pub async fn reconcile(
    State(engine): State<SharedEngine>,
    Query(query): Query<ReconcileQuery>,
) -> Result<Json<ReconcileReport>, CoreError> {
    if query.user_id.is_empty() {
        return Err(CoreError::InvalidInput("user_id is required".to_string()));
    }
    Ok(Json(engine.reconcile(&query.user_id)?))
}

/// POST /admin/tasks - bulk seed the task catalog
pub async fn seed_tasks(
    State(engine): State<SharedEngine>,
    Json(items): Json<Vec<CreateTaskInput>>,
) -> Result<Json<tasks::BulkResult>, CoreError> {
    let result = engine
        .db()
        .with_conn_mut(|conn| tasks::bulk_create_tasks(conn, items))?;
    Ok(Json(result))
}

/// POST /admin/rewards - bulk seed reward definitions
pub async fn seed_rewards(
    State(engine): State<SharedEngine>,
    Json(items): Json<Vec<CreateRewardInput>>,
) -> Result<Json<tasks::BulkResult>, CoreError> {
    let result = engine
        .db()
        .with_conn_mut(|conn| rewards::bulk_create_definitions(conn, items))?;
    Ok(Json(result))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    "OK"
}

/// GET /stats
pub async fn db_stats(State(engine): State<SharedEngine>) -> Result<Json<DbStats>, CoreError> {
    Ok(Json(engine.db().stats()?))
}
