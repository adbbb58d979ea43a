//! Project database operations

use sg_common::db::{format_timestamp, now_timestamp, parse_timestamp, parse_uuid, NewProject, Project};
use sg_common::Result;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use uuid::Uuid;

const PROJECT_COLUMNS: &str = "id, user_id, project_name, client_name, deliverables, revisions, timeline, out_of_scope, created_at";

/// Create a project owned by `owner`
pub async fn create_project(pool: &SqlitePool, owner: Uuid, scope: &NewProject) -> Result<Project> {
    let project = Project {
        id: Uuid::new_v4(),
        user_id: owner,
        project_name: scope.project_name.clone(),
        client_name: scope.client_name.clone(),
        deliverables: scope.deliverables.clone(),
        revisions: scope.revisions.clone(),
        timeline: scope.timeline.clone(),
        out_of_scope: scope.out_of_scope.clone(),
        created_at: now_timestamp(),
    };

    sqlx::query(
        r#"
        INSERT INTO projects (id, user_id, project_name, client_name, deliverables, revisions, timeline, out_of_scope, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(project.id.to_string())
    .bind(project.user_id.to_string())
    .bind(&project.project_name)
    .bind(&project.client_name)
    .bind(&project.deliverables)
    .bind(&project.revisions)
    .bind(&project.timeline)
    .bind(&project.out_of_scope)
    .bind(format_timestamp(&project.created_at))
    .execute(pool)
    .await?;

    Ok(project)
}

/// List the owner's projects, newest first
pub async fn list_projects(pool: &SqlitePool, owner: Uuid) -> Result<Vec<Project>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM projects WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
        PROJECT_COLUMNS
    ))
    .bind(owner.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(project_from_row).collect()
}

/// Load a project only if `owner` owns it
pub async fn load_owned_project(pool: &SqlitePool, owner: Uuid, project_id: Uuid) -> Result<Option<Project>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM projects WHERE id = ? AND user_id = ?",
        PROJECT_COLUMNS
    ))
    .bind(project_id.to_string())
    .bind(owner.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(project_from_row).transpose()
}

pub(crate) fn project_from_row(row: &SqliteRow) -> Result<Project> {
    let id: String = row.try_get("id")?;
    let user_id: String = row.try_get("user_id")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(Project {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        project_name: row.try_get("project_name")?,
        client_name: row.try_get("client_name")?,
        deliverables: row.try_get("deliverables")?,
        revisions: row.try_get("revisions")?,
        timeline: row.try_get("timeline")?,
        out_of_scope: row.try_get("out_of_scope")?,
        created_at: parse_timestamp(&created_at)?,
    })
}
