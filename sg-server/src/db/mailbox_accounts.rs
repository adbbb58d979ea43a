//! Stored mailbox OAuth credentials
//!
//! Acquisition of the token pair happens outside the service; these rows
//! are written by the operator CLI and refreshed by mail ingestion.

use chrono::Utc;
use sg_common::db::{format_timestamp, parse_timestamp, parse_uuid, MailboxAccount};
use sg_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Provider key for Gmail accounts
pub const GOOGLE_PROVIDER: &str = "google";

/// Insert or replace a user's token pair
pub async fn upsert_mailbox_account(
    pool: &SqlitePool,
    user_id: Uuid,
    provider: &str,
    access_token: &str,
    refresh_token: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO mailbox_accounts (user_id, provider, access_token, refresh_token, updated_at)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(user_id, provider) DO UPDATE SET
            access_token = excluded.access_token,
            refresh_token = excluded.refresh_token,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id.to_string())
    .bind(provider)
    .bind(access_token)
    .bind(refresh_token)
    .bind(format_timestamp(&Utc::now()))
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_mailbox_account(
    pool: &SqlitePool,
    user_id: Uuid,
    provider: &str,
) -> Result<Option<MailboxAccount>> {
    let row = sqlx::query(
        r#"
        SELECT user_id, provider, access_token, refresh_token, updated_at
        FROM mailbox_accounts
        WHERE user_id = ? AND provider = ?
        "#,
    )
    .bind(user_id.to_string())
    .bind(provider)
    .fetch_optional(pool)
    .await?;

    match row {
        Some(row) => {
            let user_id: String = row.try_get("user_id")?;
            let updated_at: String = row.try_get("updated_at")?;
            Ok(Some(MailboxAccount {
                user_id: parse_uuid(&user_id)?,
                provider: row.try_get("provider")?,
                access_token: row.try_get("access_token")?,
                refresh_token: row.try_get("refresh_token")?,
                updated_at: parse_timestamp(&updated_at)?,
            }))
        }
        None => Ok(None),
    }
}

/// Store a refreshed access token (refresh token unchanged)
pub async fn update_access_token(
    pool: &SqlitePool,
    user_id: Uuid,
    provider: &str,
    access_token: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE mailbox_accounts
        SET access_token = ?, updated_at = ?
        WHERE user_id = ? AND provider = ?
        "#,
    )
    .bind(access_token)
    .bind(format_timestamp(&Utc::now()))
    .bind(user_id.to_string())
    .bind(provider)
    .execute(pool)
    .await?;

    Ok(())
}
