//! Error types for sg-server
//!
//! Every failure reaching a handler is rendered as
//! `{"error": {"code", "message", "retryable"?}}` with a status that tells
//! the caller whether retrying can help.

use crate::services::{MailboxError, ModelError, PipelineError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unknown bearer token (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found or not owned by the caller (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Operation not valid in the resource's current state (412)
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Conflict (409) - e.g., email already being classified
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Mailbox or model service failed at the transport level (502/504)
    #[error("Upstream {service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
        timed_out: bool,
    },

    /// Stored mailbox credential rejected (424)
    #[error("Mailbox authorization expired")]
    MailboxAuthExpired,

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// sg-common error
    #[error("Common error: {0}")]
    Common(#[from] sg_common::Error),
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NotFound(what) => ApiError::NotFound(what),
            PipelineError::PreconditionFailed(msg) => ApiError::PreconditionFailed(msg),
            PipelineError::Conflict(msg) => ApiError::Conflict(msg),
            PipelineError::MailboxAuthExpired => ApiError::MailboxAuthExpired,
            PipelineError::Mailbox(e) => ApiError::from(e),
            PipelineError::Model(e) => ApiError::from(e),
            PipelineError::Store(e) => ApiError::Common(e),
        }
    }
}

impl From<MailboxError> for ApiError {
    fn from(err: MailboxError) -> Self {
        match err {
            MailboxError::AuthExpired => ApiError::MailboxAuthExpired,
            other => ApiError::Upstream {
                service: "mailbox",
                timed_out: other.is_timeout(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ModelError> for ApiError {
    fn from(err: ModelError) -> Self {
        ApiError::Upstream {
            service: "model",
            timed_out: err.is_timeout(),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, retryable) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, false),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, false),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, false),
            ApiError::PreconditionFailed(msg) => (
                StatusCode::PRECONDITION_FAILED,
                "PRECONDITION_FAILED",
                msg,
                false,
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, false),
            ApiError::Upstream {
                service,
                message,
                timed_out,
            } => {
                tracing::warn!(service, timed_out, error = %message, "Upstream request failed");
                let status = if timed_out {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::BAD_GATEWAY
                };
                (status, "UPSTREAM_ERROR", message, true)
            }
            ApiError::MailboxAuthExpired => (
                StatusCode::FAILED_DEPENDENCY,
                "MAILBOX_AUTH_EXPIRED",
                "Mailbox authorization expired; reconnect the mailbox".to_string(),
                false,
            ),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, false)
            }
            ApiError::Common(ref err) => common_error_parts(err),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if retryable {
            error["retryable"] = json!(true);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

fn common_error_parts(err: &sg_common::Error) -> (StatusCode, &'static str, String, bool) {
    match err {
        sg_common::Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), false),
        other => {
            tracing::error!(error = %other, "Store error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                other.to_string(),
                false,
            )
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
