use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    dto::{
        ApplyRequest, ApplyResponse, DiffRequest, DiffResponse, ListUnitsResponse,
        SuccessResponse,
    },
    error::ApiResult,
    state::AppState,
};

/// PUT /units/:name
/// Publish a revision and wait for it to be deployed
#[instrument(skip(state, payload))]
pub async fn apply_unit(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    payload: Result<Json<ApplyRequest>, JsonRejection>,
) -> ApiResult<Json<ApplyResponse>> {
    let Json(request) = payload?;
    info!("Applying unit {} at revision {}", name, request.revision);

    let cancel = state.shutdown.child_token();
    state
        .controller
        .apply(&cancel, &name, &request.revision, request.content.as_bytes())
        .await?;

    Ok(Json(ApplyResponse {
        message: format!("Revision {} of {} is deployed", request.revision, name),
        name,
        revision: request.revision,
    }))
}

/// POST /units/:name/diff
/// Compare content against what is currently deployed
#[instrument(skip(state, payload))]
pub async fn diff_unit(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    payload: Result<Json<DiffRequest>, JsonRejection>,
) -> ApiResult<Json<DiffResponse>> {
    let Json(request) = payload?;
    let cancel = state.shutdown.child_token();
    let drift = state
        .controller
        .diff(&cancel, &name, request.content.as_bytes())
        .await?;

    info!("Diff of {}: {}", name, drift.message);
    Ok(Json(drift.into()))
}

/// DELETE /units/:name
#[instrument(skip(state))]
pub async fn delete_unit(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<SuccessResponse>> {
    info!("Deleting unit {}", name);

    let cancel = state.shutdown.child_token();
    state.controller.delete(&cancel, &name).await?;

    Ok(Json(SuccessResponse {
        message: format!("Unit {name} deleted"),
    }))
}

/// GET /units
#[instrument(skip(state))]
pub async fn list_units(State(state): State<Arc<AppState>>) -> ApiResult<Json<ListUnitsResponse>> {
    let units = state.controller.list().await?;
    Ok(Json(ListUnitsResponse { units }))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "flux-bridge",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
