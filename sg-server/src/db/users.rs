//! User database operations

use sg_common::db::{format_timestamp, now_timestamp, parse_timestamp, parse_uuid, User};
use sg_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

/// Create a user identified by the hash of their API token
pub async fn create_user(pool: &SqlitePool, email: &str, api_token_hash: &str) -> Result<User> {
    let user = User {
        id: Uuid::new_v4(),
        email: email.to_string(),
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO users (id, email, api_token_hash, created_at)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(user.id.to_string())
    .bind(&user.email)
    .bind(api_token_hash)
    .bind(format_timestamp(&user.created_at))
    .execute(pool)
    .await?;

    Ok(user)
}

/// Resolve a caller identity from a token hash
pub async fn find_user_by_token_hash(pool: &SqlitePool, api_token_hash: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, email, created_at FROM users WHERE api_token_hash = ?")
        .bind(api_token_hash)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

pub async fn find_user_by_email(pool: &SqlitePool, email: &str) -> Result<Option<User>> {
    let row = sqlx::query("SELECT id, email, created_at FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(user_from_row).transpose()
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(User {
        id: parse_uuid(&id)?,
        email: row.try_get("email")?,
        created_at: parse_timestamp(&created_at)?,
    })
}
