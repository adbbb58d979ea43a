//! Database models
//!
//! Field names serialize in camelCase so rows can be returned to API
//! consumers unchanged.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Account that owns projects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Stored OAuth token pair for one user's mailbox
#[derive(Debug, Clone)]
pub struct MailboxAccount {
    pub user_id: Uuid,
    pub provider: String,
    pub access_token: String,
    pub refresh_token: String,
    pub updated_at: DateTime<Utc>,
}

/// Agreed project scope (immutable once created)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: Uuid,
    pub user_id: Uuid,
    pub project_name: String,
    pub client_name: String,
    pub deliverables: String,
    pub revisions: String,
    pub timeline: String,
    pub out_of_scope: String,
    pub created_at: DateTime<Utc>,
}

/// Scope fields supplied when creating a project
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub project_name: String,
    pub client_name: String,
    pub deliverables: String,
    pub revisions: String,
    pub timeline: String,
    pub out_of_scope: String,
}

/// Client email linked to a project
///
/// Classification fields stay `None` until a verdict is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: Uuid,
    /// Mailbox provider message id (unique across the store)
    pub message_id: String,
    pub project_id: Uuid,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
    pub in_scope: Option<bool>,
    /// 0-100
    pub confidence: Option<i64>,
    pub reason: Option<String>,
    /// True when the verdict is the fallback for unparsable model output
    pub verdict_degraded: Option<bool>,
    pub generated_response: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Email {
    /// Classified as scope creep
    pub fn is_out_of_scope(&self) -> bool {
        self.in_scope == Some(false)
    }
}

/// Email fields produced by mail ingestion, before persistence
#[derive(Debug, Clone, PartialEq)]
pub struct NewEmail {
    pub message_id: String,
    pub subject: String,
    pub sender: String,
    pub recipient: String,
    pub body: String,
    pub received_at: DateTime<Utc>,
}

/// Project together with its emails (newest first)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithEmails {
    #[serde(flatten)]
    pub project: Project,
    pub emails: Vec<Email>,
}

/// Format a timestamp for storage
///
/// Fixed-width UTC RFC 3339 so that lexical order equals time order.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Truncate to the precision kept by [`format_timestamp`]
pub fn storage_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Current time at storage precision
pub fn now_timestamp() -> DateTime<Utc> {
    storage_precision(Utc::now())
}

/// Parse a stored timestamp
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid stored timestamp '{}': {}", value, e)))
}

/// Parse a stored UUID
pub fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid stored id '{}': {}", value, e)))
}
