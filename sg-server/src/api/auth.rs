//! Bearer-token authentication middleware
//!
//! Resolves `Authorization: Bearer <token>` to a user by the token's
//! SHA-256 hash and attaches a [`Caller`] to the request. Requests without
//! a resolvable identity are rejected before any handler runs.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use sg_common::auth::{hash_api_token, parse_bearer};
use tracing::debug;
use uuid::Uuid;

use crate::db::users;
use crate::error::ApiError;
use crate::AppState;

/// Authenticated identity, available to handlers as `Extension<Caller>`
#[derive(Debug, Clone)]
pub struct Caller {
    pub user_id: Uuid,
    pub email: String,
}

/// Authentication middleware
///
/// Applied to protected routes only; `/health` does not use it.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer)
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?;

    let user = users::find_user_by_token_hash(&state.db, &hash_api_token(token))
        .await?
        .ok_or_else(|| {
            debug!("Rejected unknown bearer token");
            ApiError::Unauthorized("Invalid bearer token".to_string())
        })?;

    request.extensions_mut().insert(Caller {
        user_id: user.id,
        email: user.email,
    });

    Ok(next.run(request).await)
}
