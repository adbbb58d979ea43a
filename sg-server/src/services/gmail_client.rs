//! Gmail API v1 client
//!
//! Read-only: lists messages matching a search query and fetches full
//! message content. Also performs OAuth2 refresh-token grants when client
//! credentials are configured.

use base64::Engine;
use serde::Deserialize;
use sg_common::config::MailboxConfig;
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = concat!("ScopeGuard/", env!("CARGO_PKG_VERSION"));

/// Mailbox client errors
#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP 401: access token expired or revoked
    #[error("Mailbox credential rejected")]
    AuthExpired,

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

impl MailboxError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, MailboxError::Timeout(_))
    }
}

// ============================================================================
// API response types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullMessageDetail {
    id: String,
    /// Epoch milliseconds, serialized as a string
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<FullPayload>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FullPayload {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    body: Option<PayloadBody>,
    #[serde(default)]
    parts: Vec<FullPayload>,
}

#[derive(Debug, Deserialize)]
struct Header {
    #[serde(default)]
    name: String,
    #[serde(default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct PayloadBody {
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

// ============================================================================
// Public types
// ============================================================================

/// One fetched message, headers and decoded plain-text body
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub id: String,
    pub subject: String,
    pub from: String,
    pub to: String,
    /// Raw `Date` header, when present
    pub date: Option<String>,
    /// Provider receive time, epoch milliseconds
    pub internal_date_ms: Option<i64>,
    pub body: String,
}

// ============================================================================
// Client
// ============================================================================

/// Gmail API client
pub struct GmailClient {
    http_client: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: Option<String>,
    client_secret: Option<String>,
    timeout: Duration,
}

impl GmailClient {
    pub fn new(config: &MailboxConfig) -> Result<Self, MailboxError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.timeout())
            .build()
            .map_err(|e| MailboxError::NetworkError(e.to_string()))?;

        let (client_id, client_secret) = if config.refresh_enabled() {
            (config.client_id.clone(), config.client_secret.clone())
        } else {
            (None, None)
        };

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.clone(),
            client_id,
            client_secret,
            timeout: config.timeout(),
        })
    }

    /// Whether refresh-token grants are possible
    pub fn can_refresh(&self) -> bool {
        self.client_id.is_some() && self.client_secret.is_some()
    }

    /// List message ids matching `query`, at most `max_results`
    pub async fn list_message_ids(
        &self,
        access_token: &str,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<String>, MailboxError> {
        let url = format!("{}/gmail/v1/users/me/messages", self.base_url);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("q", query), ("maxResults", &max_results.to_string())])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;
        let list: MessageListResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::ParseError(e.to_string()))?;

        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    /// Fetch one message in `format=full`
    pub async fn get_message(
        &self,
        access_token: &str,
        message_id: &str,
    ) -> Result<MailMessage, MailboxError> {
        let url = format!("{}/gmail/v1/users/me/messages/{}", self.base_url, message_id);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("format", "full")])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let response = check_status(response).await?;
        let detail: FullMessageDetail = response
            .json()
            .await
            .map_err(|e| MailboxError::ParseError(e.to_string()))?;

        Ok(message_from_detail(detail))
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<String, MailboxError> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(MailboxError::RefreshFailed(
                "OAuth client credentials not configured".to_string(),
            ));
        };

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
        ];

        let response = self
            .http_client
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();
            return Err(MailboxError::RefreshFailed(format!("{}: {}", status, error_text)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| MailboxError::RefreshFailed(e.to_string()))?;

        tracing::info!("Mailbox access token refreshed");
        Ok(token.access_token)
    }

    fn map_send_error(&self, e: reqwest::Error) -> MailboxError {
        if e.is_timeout() {
            MailboxError::Timeout(self.timeout)
        } else {
            MailboxError::NetworkError(e.to_string())
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, MailboxError> {
    let status = response.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(MailboxError::AuthExpired);
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MailboxError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(response)
}

fn message_from_detail(detail: FullMessageDetail) -> MailMessage {
    let payload = detail.payload.unwrap_or_default();

    let header = |name: &str| -> Option<String> {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };

    MailMessage {
        subject: header("Subject").unwrap_or_default(),
        from: header("From").unwrap_or_default(),
        to: header("To").unwrap_or_default(),
        date: header("Date"),
        internal_date_ms: detail.internal_date.as_deref().and_then(|d| d.parse().ok()),
        body: extract_plain_body(&payload),
        id: detail.id,
    }
}

/// Plain-text body of a message
///
/// A `text/plain` part anywhere in a multipart tree wins; otherwise the
/// top-level body data is used. Missing or undecodable data yields "".
fn extract_plain_body(payload: &FullPayload) -> String {
    if let Some(text) = find_part_text(&payload.parts, "text/plain") {
        return text;
    }

    payload
        .body
        .as_ref()
        .and_then(|b| b.data.as_deref())
        .and_then(decode_url_safe_base64)
        .unwrap_or_default()
}

fn find_part_text(parts: &[FullPayload], target_mime: &str) -> Option<String> {
    for part in parts {
        if part.mime_type.eq_ignore_ascii_case(target_mime) {
            if let Some(text) = part
                .body
                .as_ref()
                .and_then(|b| b.data.as_deref())
                .and_then(decode_url_safe_base64)
            {
                return Some(text);
            }
        }
        if let Some(text) = find_part_text(&part.parts, target_mime) {
            return Some(text);
        }
    }
    None
}

/// Decode URL-safe base64 as used by the Gmail API (padding optional)
fn decode_url_safe_base64(data: &str) -> Option<String> {
    base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(data.trim_end_matches('='))
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
