//! HTTP API handlers for sg-server
//!
//! JSON in and out, camelCase field names. Everything except `/health`
//! sits behind [`auth::auth_middleware`].

pub mod auth;
pub mod emails;
pub mod health;
pub mod monitor;
pub mod projects;

pub use auth::{auth_middleware, Caller};
pub use emails::email_routes;
pub use health::health_routes;
pub use monitor::monitor_routes;
pub use projects::project_routes;

use crate::error::ApiError;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::Path;
use axum::Json;
use uuid::Uuid;

/// Unwrap a JSON body, reporting any rejection as 400
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}

/// Unwrap an `:id` path segment, reporting a malformed id as 400
pub(crate) fn path_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id)
        .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))
}
