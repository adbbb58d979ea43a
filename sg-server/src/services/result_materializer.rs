//! Writes classification results back onto stored emails
//!
//! Each write overwrites the target fields; nothing is merged with prior
//! values, so repeating a write leaves the row unchanged. A target the
//! caller does not own is reported as not found.

use crate::db::emails;
use crate::services::scope_classifier::Verdict;
use crate::services::PipelineError;
use sg_common::db::Email;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Store `verdict` on an owned email and return the updated row
pub async fn apply_verdict(
    pool: &SqlitePool,
    owner: Uuid,
    email_id: Uuid,
    verdict: &Verdict,
) -> Result<Email, PipelineError> {
    let updated = emails::update_verdict(
        pool,
        owner,
        email_id,
        verdict.in_scope,
        verdict.confidence,
        &verdict.reason,
        verdict.degraded,
    )
    .await?;

    if updated == 0 {
        return Err(PipelineError::NotFound(format!("Email {}", email_id)));
    }

    reload(pool, owner, email_id).await
}

/// Store a drafted reply on an owned, out-of-scope email
pub async fn apply_generated_response(
    pool: &SqlitePool,
    owner: Uuid,
    email_id: Uuid,
    text: &str,
) -> Result<Email, PipelineError> {
    let email = reload(pool, owner, email_id).await?;
    if !email.is_out_of_scope() {
        return Err(PipelineError::PreconditionFailed(format!(
            "Email {} is not classified out of scope",
            email_id
        )));
    }

    let updated = emails::update_generated_response(pool, owner, email_id, text).await?;
    if updated == 0 {
        // Reclassified in scope between the check and the write
        return Err(PipelineError::PreconditionFailed(format!(
            "Email {} is not classified out of scope",
            email_id
        )));
    }

    reload(pool, owner, email_id).await
}

async fn reload(pool: &SqlitePool, owner: Uuid, email_id: Uuid) -> Result<Email, PipelineError> {
    emails::load_owned_email(pool, owner, email_id)
        .await?
        .ok_or_else(|| PipelineError::NotFound(format!("Email {}", email_id)))
}
