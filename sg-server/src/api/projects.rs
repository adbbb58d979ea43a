//! Project API handlers
//!
//! GET/POST /api/projects, GET /api/projects/:id

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    http::StatusCode,
    routing::get,
    Extension, Json, Router,
};
use sg_common::db::{NewProject, Project, ProjectWithEmails};
use uuid::Uuid;

use crate::api::{json_body, path_id, Caller};
use crate::db::projects;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// GET /api/projects
///
/// The caller's projects, newest first.
pub async fn list_projects(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Vec<Project>>> {
    let projects = projects::list_projects(&state.db, caller.user_id).await?;
    Ok(Json(projects))
}

/// POST /api/projects
pub async fn create_project(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<NewProject>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let scope = json_body(payload)?;

    if scope.project_name.trim().is_empty() {
        return Err(ApiError::BadRequest("projectName is required".to_string()));
    }
    if scope.client_name.trim().is_empty() {
        return Err(ApiError::BadRequest("clientName is required".to_string()));
    }

    let project = projects::create_project(&state.db, caller.user_id, &scope).await?;

    tracing::info!(
        project_id = %project.id,
        user_id = %caller.user_id,
        client = %project.client_name,
        "Project created"
    );

    Ok((StatusCode::CREATED, Json(project)))
}

/// GET /api/projects/:id
///
/// Project with its emails, most recently received first.
pub async fn get_project(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<ProjectWithEmails>> {
    let project_id = path_id(path)?;
    let project = state
        .pipeline
        .load_project_with_emails(caller.user_id, project_id)
        .await?;
    Ok(Json(project))
}

/// Build project routes
pub fn project_routes() -> Router<AppState> {
    Router::new()
        .route("/api/projects", get(list_projects).post(create_project))
        .route("/api/projects/:id", get(get_project))
}
