//! Mailbox monitor API handlers
//!
//! GET/POST/DELETE /api/projects/:id/monitor

use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Extension, Json, Router,
};
use uuid::Uuid;

use crate::api::{path_id, Caller};
use crate::error::ApiResult;
use crate::services::MonitorStatus;
use crate::AppState;

/// GET /api/projects/:id/monitor
pub async fn get_monitor(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<MonitorStatus>> {
    let project_id = path_id(path)?;
    state.pipeline.load_project(caller.user_id, project_id).await?;
    Ok(Json(state.monitors.status(project_id).await))
}

/// POST /api/projects/:id/monitor
///
/// 409 when a monitor is already running for the project.
pub async fn start_monitor(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<MonitorStatus>> {
    let project_id = path_id(path)?;
    state.pipeline.load_project(caller.user_id, project_id).await?;

    let status = state
        .monitors
        .start(
            state.pipeline.clone(),
            caller.user_id,
            project_id,
            state.monitor_interval,
        )
        .await?;

    Ok(Json(status))
}

/// DELETE /api/projects/:id/monitor
pub async fn stop_monitor(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<MonitorStatus>> {
    let project_id = path_id(path)?;
    state.pipeline.load_project(caller.user_id, project_id).await?;
    Ok(Json(state.monitors.stop(project_id).await))
}

/// Build monitor routes
pub fn monitor_routes() -> Router<AppState> {
    Router::new().route(
        "/api/projects/:id/monitor",
        get(get_monitor).post(start_monitor).delete(stop_monitor),
    )
}
