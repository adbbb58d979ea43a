//! Mail ingestion
//!
//! Pulls a project's client correspondence from the owner's mailbox and
//! stores every message not seen before. Messages are processed one at a
//! time in listing order and each is committed as soon as it is built, so a
//! failure part-way through leaves earlier inserts in place.

use crate::db::{emails, mailbox_accounts};
use crate::services::gmail_client::{GmailClient, MailMessage, MailboxError};
use crate::services::PipelineError;
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use sg_common::config::MailboxConfig;
use sg_common::db::{Email, MailboxAccount, NewEmail, Project};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// Result of one ingestion call
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// Emails created by this call, in listing order
    pub created: Vec<Email>,
    /// Messages returned by the mailbox search
    pub listed: usize,
    /// Messages already stored before this call
    pub skipped_existing: usize,
    /// Messages whose content could not be fetched
    pub failed: usize,
}

/// Gmail search query selecting mail to or from the project's client
///
/// The client name is lower-cased with all whitespace removed and used as
/// an address local part: "Acme Corp" → `from:acmecorp@* OR to:acmecorp@*`.
pub fn mailbox_query(client_name: &str) -> String {
    let local: String = client_name
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    format!("from:{local}@* OR to:{local}@*")
}

/// Truncate to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Received time of a message
///
/// `Date` header (RFC 2822), then the provider's internal date, then now.
pub fn received_at(message: &MailMessage) -> DateTime<Utc> {
    if let Some(date) = message.date.as_deref().and_then(parse_date_header) {
        return date;
    }

    if let Some(ts) = message
        .internal_date_ms
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
    {
        return ts;
    }

    Utc::now()
}

fn parse_date_header(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    // Trailing comment such as "(UTC)"
    let value = match value.rfind('(') {
        Some(idx) if value.ends_with(')') => value[..idx].trim_end(),
        _ => value,
    };

    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Build the stored form of a fetched message
pub fn new_email_from_message(message: MailMessage, body_max_chars: usize) -> NewEmail {
    let received_at = received_at(&message);
    NewEmail {
        body: truncate_chars(&message.body, body_max_chars),
        message_id: message.id,
        subject: message.subject,
        sender: message.from,
        recipient: message.to,
        received_at,
    }
}

/// Mailbox access for one ingestion call, refreshing the access token at
/// most once when the provider rejects it
struct MailboxSession<'a> {
    pool: &'a SqlitePool,
    gmail: &'a GmailClient,
    account: MailboxAccount,
    refreshed: bool,
}

impl<'a> MailboxSession<'a> {
    async fn list_message_ids(&mut self, query: &str, max_results: u32) -> Result<Vec<String>, PipelineError> {
        match self
            .gmail
            .list_message_ids(&self.account.access_token, query, max_results)
            .await
        {
            Err(MailboxError::AuthExpired) => {
                self.refresh().await?;
                Ok(self
                    .gmail
                    .list_message_ids(&self.account.access_token, query, max_results)
                    .await?)
            }
            other => Ok(other?),
        }
    }

    async fn get_message(&mut self, message_id: &str) -> Result<MailMessage, PipelineError> {
        match self.gmail.get_message(&self.account.access_token, message_id).await {
            Err(MailboxError::AuthExpired) => {
                self.refresh().await?;
                Ok(self
                    .gmail
                    .get_message(&self.account.access_token, message_id)
                    .await?)
            }
            other => Ok(other?),
        }
    }

    async fn refresh(&mut self) -> Result<(), PipelineError> {
        if self.refreshed || !self.gmail.can_refresh() || self.account.refresh_token.trim().is_empty() {
            return Err(PipelineError::MailboxAuthExpired);
        }
        self.refreshed = true;

        let access_token = match self.gmail.refresh_access_token(&self.account.refresh_token).await {
            Ok(token) => token,
            Err(e) => {
                warn!(user_id = %self.account.user_id, error = %e, "Mailbox token refresh failed");
                return Err(PipelineError::MailboxAuthExpired);
            }
        };

        mailbox_accounts::update_access_token(
            self.pool,
            self.account.user_id,
            &self.account.provider,
            &access_token,
        )
        .await?;
        self.account.access_token = access_token;
        Ok(())
    }
}

/// Ingest new emails for `project` from its owner's mailbox
///
/// The project must already be verified as owned by the caller.
pub async fn fetch_new_emails(
    pool: &SqlitePool,
    gmail: &GmailClient,
    config: &MailboxConfig,
    project: &Project,
) -> Result<IngestOutcome, PipelineError> {
    let account = mailbox_accounts::load_mailbox_account(
        pool,
        project.user_id,
        mailbox_accounts::GOOGLE_PROVIDER,
    )
    .await?
    .filter(|a| !a.access_token.trim().is_empty())
    .ok_or_else(|| PipelineError::PreconditionFailed("mailbox not connected".to_string()))?;

    let mut session = MailboxSession {
        pool,
        gmail,
        account,
        refreshed: false,
    };

    let query = mailbox_query(&project.client_name);
    let message_ids = session.list_message_ids(&query, config.page_size).await?;

    let mut outcome = IngestOutcome {
        listed: message_ids.len(),
        ..Default::default()
    };

    debug!(project_id = %project.id, query = %query, listed = outcome.listed, "Mailbox search complete");

    for message_id in &message_ids {
        if emails::message_exists(pool, message_id).await? {
            outcome.skipped_existing += 1;
            continue;
        }

        let message = match session.get_message(message_id).await {
            Ok(message) => message,
            // Only per-message transport failures are skippable
            Err(PipelineError::Mailbox(e)) => {
                warn!(
                    project_id = %project.id,
                    message_id = %message_id,
                    error = %e,
                    "Skipping message: fetch failed"
                );
                outcome.failed += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        let new_email = new_email_from_message(message, config.body_max_chars);
        if let Some(email) = emails::insert_email(pool, project.id, &new_email).await? {
            outcome.created.push(email);
        } else {
            outcome.skipped_existing += 1;
        }
    }

    info!(
        project_id = %project.id,
        listed = outcome.listed,
        created = outcome.created.len(),
        skipped = outcome.skipped_existing,
        failed = outcome.failed,
        "Mail ingestion complete"
    );

    Ok(outcome)
}
