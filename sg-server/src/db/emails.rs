//! Email database operations
//!
//! `message_id` is UNIQUE across the store; inserting a message that is
//! already stored (for any project) is a silent no-op.

use sg_common::db::{format_timestamp, now_timestamp, parse_timestamp, parse_uuid, storage_precision, Email, NewEmail};
use sg_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const EMAIL_COLUMNS: &str = "e.id, e.message_id, e.project_id, e.subject, e.sender, e.recipient, e.body, \
     e.received_at, e.in_scope, e.confidence, e.reason, e.verdict_degraded, e.generated_response, e.created_at";

/// Whether a mailbox message is already stored (any project)
pub async fn message_exists(pool: &SqlitePool, message_id: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM emails WHERE message_id = ?")
        .bind(message_id)
        .fetch_one(pool)
        .await?;

    Ok(count > 0)
}

/// Insert an ingested email under `project_id`
///
/// Returns `None` when the message id was already stored.
pub async fn insert_email(pool: &SqlitePool, project_id: Uuid, new: &NewEmail) -> Result<Option<Email>> {
    let email = Email {
        id: Uuid::new_v4(),
        message_id: new.message_id.clone(),
        project_id,
        subject: new.subject.clone(),
        sender: new.sender.clone(),
        recipient: new.recipient.clone(),
        body: new.body.clone(),
        received_at: storage_precision(new.received_at),
        in_scope: None,
        confidence: None,
        reason: None,
        verdict_degraded: None,
        generated_response: None,
        created_at: now_timestamp(),
    };

    let result = sqlx::query(
        r#"
        INSERT INTO emails (id, message_id, project_id, subject, sender, recipient, body, received_at, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(message_id) DO NOTHING
        "#,
    )
    .bind(email.id.to_string())
    .bind(&email.message_id)
    .bind(project_id.to_string())
    .bind(&email.subject)
    .bind(&email.sender)
    .bind(&email.recipient)
    .bind(&email.body)
    .bind(format_timestamp(&email.received_at))
    .bind(format_timestamp(&email.created_at))
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }

    Ok(Some(email))
}

/// Emails of one project, most recently received first
pub async fn list_project_emails(pool: &SqlitePool, project_id: Uuid) -> Result<Vec<Email>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM emails e WHERE e.project_id = ? ORDER BY e.received_at DESC, e.rowid DESC",
        EMAIL_COLUMNS
    ))
    .bind(project_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(email_from_row).collect()
}

/// Load an email whose project is owned by `owner`
pub async fn load_owned_email(pool: &SqlitePool, owner: Uuid, email_id: Uuid) -> Result<Option<Email>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM emails e JOIN projects p ON p.id = e.project_id WHERE e.id = ? AND p.user_id = ?",
        EMAIL_COLUMNS
    ))
    .bind(email_id.to_string())
    .bind(owner.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(email_from_row).transpose()
}

/// Overwrite the classification fields of an owned email
///
/// An in-scope verdict also clears any previously drafted response.
/// Returns the number of rows updated (0 when missing or not owned).
pub async fn update_verdict(
    pool: &SqlitePool,
    owner: Uuid,
    email_id: Uuid,
    in_scope: bool,
    confidence: i64,
    reason: &str,
    degraded: bool,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE emails
        SET in_scope = ?,
            confidence = ?,
            reason = ?,
            verdict_degraded = ?,
            generated_response = CASE WHEN ? THEN NULL ELSE generated_response END
        WHERE id = ?
          AND project_id IN (SELECT id FROM projects WHERE user_id = ?)
        "#,
    )
    .bind(in_scope)
    .bind(confidence)
    .bind(reason)
    .bind(degraded)
    .bind(in_scope)
    .bind(email_id.to_string())
    .bind(owner.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Store a drafted reply on an owned, out-of-scope email
///
/// Returns the number of rows updated (0 when missing, not owned, or not
/// classified out of scope).
pub async fn update_generated_response(
    pool: &SqlitePool,
    owner: Uuid,
    email_id: Uuid,
    text: &str,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE emails
        SET generated_response = ?
        WHERE id = ?
          AND in_scope = 0
          AND project_id IN (SELECT id FROM projects WHERE user_id = ?)
        "#,
    )
    .bind(text)
    .bind(email_id.to_string())
    .bind(owner.to_string())
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

fn email_from_row(row: &SqliteRow) -> Result<Email> {
    let id: String = row.try_get("id")?;
    let project_id: String = row.try_get("project_id")?;
    let received_at: String = row.try_get("received_at")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Email {
        id: parse_uuid(&id)?,
        message_id: row.try_get("message_id")?,
        project_id: parse_uuid(&project_id)?,
        subject: row.try_get("subject")?,
        sender: row.try_get("sender")?,
        recipient: row.try_get("recipient")?,
        body: row.try_get("body")?,
        received_at: parse_timestamp(&received_at)?,
        in_scope: row.try_get("in_scope")?,
        confidence: row.try_get("confidence")?,
        reason: row.try_get("reason")?,
        verdict_degraded: row.try_get("verdict_degraded")?,
        generated_response: row.try_get("generated_response")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::projects::create_project;
    use crate::db::users::create_user;
    use chrono::{Duration, TimeZone, Utc};
    use sg_common::db::{init_memory_database, NewProject};

    async fn setup() -> (SqlitePool, Uuid, Uuid) {
        let pool = init_memory_database().await.unwrap();
        let user = create_user(&pool, "dana@studio.test", "h").await.unwrap();
        let project = create_project(&pool, user.id, &NewProject::default()).await.unwrap();
        (pool, user.id, project.id)
    }

    fn new_email(message_id: &str, offset_minutes: i64) -> NewEmail {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        NewEmail {
            message_id: message_id.to_string(),
            subject: format!("Subject {}", message_id),
            sender: "client@acme.test".to_string(),
            recipient: "dana@studio.test".to_string(),
            body: "Could you also animate the logo?".to_string(),
            received_at: base + Duration::minutes(offset_minutes),
        }
    }

    #[tokio::test]
    async fn test_insert_is_idempotent_per_message_id() {
        let (pool, _, project_id) = setup().await;

        let first = insert_email(&pool, project_id, &new_email("m1", 0)).await.unwrap();
        assert!(first.is_some());
        assert!(message_exists(&pool, "m1").await.unwrap());

        let second = insert_email(&pool, project_id, &new_email("m1", 0)).await.unwrap();
        assert!(second.is_none());

        assert_eq!(list_project_emails(&pool, project_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inserted_email_matches_stored_row() {
        let (pool, owner, project_id) = setup().await;
        let mut fresh = new_email("m1", 0);
        fresh.received_at = Utc::now();

        let inserted = insert_email(&pool, project_id, &fresh).await.unwrap().unwrap();
        let stored = load_owned_email(&pool, owner, inserted.id).await.unwrap().unwrap();

        assert_eq!(inserted, stored);
    }

    #[tokio::test]
    async fn test_list_orders_by_received_desc() {
        let (pool, _, project_id) = setup().await;
        insert_email(&pool, project_id, &new_email("old", 0)).await.unwrap();
        insert_email(&pool, project_id, &new_email("new", 90)).await.unwrap();
        insert_email(&pool, project_id, &new_email("mid", 30)).await.unwrap();

        let ids: Vec<_> = list_project_emails(&pool, project_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.message_id)
            .collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[tokio::test]
    async fn test_verdict_update_is_owner_scoped() {
        let (pool, owner, project_id) = setup().await;
        let stranger = create_user(&pool, "eve@studio.test", "h2").await.unwrap();
        let email = insert_email(&pool, project_id, &new_email("m1", 0))
            .await
            .unwrap()
            .unwrap();

        let updated = update_verdict(&pool, stranger.id, email.id, false, 80, "animation", false)
            .await
            .unwrap();
        assert_eq!(updated, 0);
        assert!(load_owned_email(&pool, stranger.id, email.id).await.unwrap().is_none());

        let updated = update_verdict(&pool, owner, email.id, false, 80, "animation", false)
            .await
            .unwrap();
        assert_eq!(updated, 1);

        let stored = load_owned_email(&pool, owner, email.id).await.unwrap().unwrap();
        assert_eq!(stored.in_scope, Some(false));
        assert_eq!(stored.confidence, Some(80));
        assert_eq!(stored.reason.as_deref(), Some("animation"));
        assert_eq!(stored.verdict_degraded, Some(false));
    }

    #[tokio::test]
    async fn test_in_scope_verdict_clears_draft() {
        let (pool, owner, project_id) = setup().await;
        let email = insert_email(&pool, project_id, &new_email("m1", 0))
            .await
            .unwrap()
            .unwrap();

        update_verdict(&pool, owner, email.id, false, 90, "extra", false).await.unwrap();
        assert_eq!(
            update_generated_response(&pool, owner, email.id, "Happy to quote that.").await.unwrap(),
            1
        );

        update_verdict(&pool, owner, email.id, true, 70, "covered", false).await.unwrap();
        let stored = load_owned_email(&pool, owner, email.id).await.unwrap().unwrap();
        assert_eq!(stored.in_scope, Some(true));
        assert!(stored.generated_response.is_none());
    }

    #[tokio::test]
    async fn test_draft_requires_out_of_scope() {
        let (pool, owner, project_id) = setup().await;
        let email = insert_email(&pool, project_id, &new_email("m1", 0))
            .await
            .unwrap()
            .unwrap();

        // Unclassified
        assert_eq!(update_generated_response(&pool, owner, email.id, "x").await.unwrap(), 0);

        update_verdict(&pool, owner, email.id, true, 70, "covered", false).await.unwrap();
        assert_eq!(update_generated_response(&pool, owner, email.id, "x").await.unwrap(), 0);
    }
}
