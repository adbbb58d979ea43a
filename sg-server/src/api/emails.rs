//! Email pipeline API handlers
//!
//! POST /api/emails/fetch, /api/emails/analyze, /api/emails/generate-response

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use sg_common::db::Email;
use uuid::Uuid;

use crate::api::{json_body, Caller};
use crate::error::{ApiError, ApiResult};
use crate::services::Verdict;
use crate::AppState;

/// POST /api/emails/fetch request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEmailsRequest {
    #[serde(default)]
    pub project_id: Option<String>,
}

/// POST /api/emails/fetch response
#[derive(Debug, Serialize)]
pub struct FetchEmailsResponse {
    pub success: bool,
    /// Number of emails created by this call
    pub count: usize,
    pub emails: Vec<Email>,
}

/// Request naming one email
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[serde(default)]
    pub email_id: Option<String>,
}

/// POST /api/emails/analyze response
#[derive(Debug, Serialize)]
pub struct AnalyzeEmailResponse {
    pub success: bool,
    pub analysis: Verdict,
    pub email: Email,
}

/// POST /api/emails/generate-response response
#[derive(Debug, Serialize)]
pub struct GenerateResponseResponse {
    pub success: bool,
    pub response: String,
    pub email: Email,
}

fn required_id(value: Option<String>, field: &str) -> ApiResult<Uuid> {
    let value = value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest(format!("{} is required", field)))?;

    Uuid::parse_str(value.trim())
        .map_err(|_| ApiError::BadRequest(format!("{} is not a valid id", field)))
}

/// POST /api/emails/fetch
///
/// Ingest unseen client emails for a project.
pub async fn fetch_emails(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<FetchEmailsRequest>, JsonRejection>,
) -> ApiResult<Json<FetchEmailsResponse>> {
    let request = json_body(payload)?;
    let project_id = required_id(request.project_id, "projectId")?;

    let outcome = state
        .track(state.pipeline.fetch_new_emails(caller.user_id, project_id).await)
        .await?;

    Ok(Json(FetchEmailsResponse {
        success: true,
        count: outcome.created.len(),
        emails: outcome.created,
    }))
}

/// POST /api/emails/analyze
///
/// Classify an email and store the verdict.
pub async fn analyze_email(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> ApiResult<Json<AnalyzeEmailResponse>> {
    let request = json_body(payload)?;
    let email_id = required_id(request.email_id, "emailId")?;

    let (analysis, email) = state
        .track(state.pipeline.classify_email(caller.user_id, email_id).await)
        .await?;

    Ok(Json(AnalyzeEmailResponse {
        success: true,
        analysis,
        email,
    }))
}

/// POST /api/emails/generate-response
///
/// Draft a reply to an out-of-scope email.
pub async fn generate_response(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<EmailRequest>, JsonRejection>,
) -> ApiResult<Json<GenerateResponseResponse>> {
    let request = json_body(payload)?;
    let email_id = required_id(request.email_id, "emailId")?;

    let (response, email) = state
        .track(state.pipeline.draft_response(caller.user_id, email_id).await)
        .await?;

    Ok(Json(GenerateResponseResponse {
        success: true,
        response,
        email,
    }))
}

/// Build email pipeline routes
pub fn email_routes() -> Router<AppState> {
    Router::new()
        .route("/api/emails/fetch", post(fetch_emails))
        .route("/api/emails/analyze", post(analyze_email))
        .route("/api/emails/generate-response", post(generate_response))
}
