use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use serde::Deserialize;
use tracing::{debug, info};

use common::types::{ApiMessage, LockStatus};
use service::LeaseDuration;

use crate::errors::ApiError;
use crate::routes::ServerState;

pub const LOCK_INVALID: &str = "Invalid request: tableId, userId, and positive duration required.";
pub const UNLOCK_INVALID: &str = "Invalid request: tableId and userId required.";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRequest {
    pub table_id: String,
    pub user_id: String,
    /// Seconds; fractions allowed.
    pub duration: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockRequest {
    pub table_id: String,
    pub user_id: String,
}

/// Body problems (bad JSON, wrong field types, missing content type) are all
/// plain invalid requests here rather than axum's 415/422.
fn parse_body<T>(
    payload: Result<Json<T>, JsonRejection>,
    message: &'static str,
) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        debug!(reason = %rejection.body_text(), "rejected request body");
        ApiError::bad_request(message)
    })
}

/// POST /api/tables/lock
pub async fn lock_table(
    State(state): State<ServerState>,
    payload: Result<Json<LockRequest>, JsonRejection>,
) -> Result<Json<ApiMessage>, ApiError> {
    let req = parse_body(payload, LOCK_INVALID)?;
    let duration = LeaseDuration::from_secs_f64(req.duration)
        .map_err(|e| ApiError::from_lock_error(e, LOCK_INVALID))?;

    state
        .locks
        .acquire(&req.table_id, &req.user_id, duration)
        .map_err(|e| ApiError::from_lock_error(e, LOCK_INVALID))?;

    info!(
        table_id = %req.table_id,
        user_id = %req.user_id,
        duration_secs = req.duration,
        "table locked"
    );
    Ok(Json(ApiMessage::ok("Table locked successfully.")))
}

/// POST /api/tables/unlock
pub async fn unlock_table(
    State(state): State<ServerState>,
    payload: Result<Json<UnlockRequest>, JsonRejection>,
) -> Result<Json<ApiMessage>, ApiError> {
    let req = parse_body(payload, UNLOCK_INVALID)?;

    state
        .locks
        .release(&req.table_id, &req.user_id)
        .map_err(|e| ApiError::from_lock_error(e, UNLOCK_INVALID))?;

    info!(table_id = %req.table_id, user_id = %req.user_id, "table unlocked");
    Ok(Json(ApiMessage::ok("Table unlocked successfully.")))
}

/// GET /api/tables/:tableId/status
pub async fn table_status(
    State(state): State<ServerState>,
    Path(table_id): Path<String>,
) -> Json<LockStatus> {
    Json(LockStatus { is_locked: state.locks.status(&table_id) })
}
