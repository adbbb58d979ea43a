//! Shared fixtures for sg-server integration tests
//!
//! Each test gets an in-memory database, a wiremock server standing in for
//! the model provider and another for Gmail (plus its token endpoint).

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use base64::Engine;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use sg_common::auth::{generate_api_token, hash_api_token};
use sg_common::config::{ModelProvider, TomlConfig};
use sg_common::db::{init_memory_database, NewEmail, NewProject, Project};
use sg_server::db::{emails, mailbox_accounts, projects, users};
use sg_server::services::{build_language_model, GmailClient};
use sg_server::{build_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;
use wiremock::MockServer;

pub struct TestApp {
    pub state: AppState,
    pub model_server: MockServer,
    pub gmail_server: MockServer,
    pub token: String,
    pub user_id: Uuid,
}

pub fn test_config(model_uri: &str, gmail_uri: &str) -> TomlConfig {
    let mut config = TomlConfig::default();
    config.model.provider = ModelProvider::Anthropic;
    config.model.base_url = Some(model_uri.to_string());
    config.model.timeout_secs = 1;
    config.mailbox.base_url = gmail_uri.to_string();
    config.mailbox.token_url = format!("{}/token", gmail_uri);
    config.mailbox.client_id = Some("client-id".to_string());
    config.mailbox.client_secret = Some("client-secret".to_string());
    config.mailbox.timeout_secs = 1;
    config
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut TomlConfig)) -> Self {
        let model_server = MockServer::start().await;
        let gmail_server = MockServer::start().await;

        let mut config = test_config(&model_server.uri(), &gmail_server.uri());
        adjust(&mut config);

        let pool = init_memory_database().await.unwrap();
        let token = generate_api_token();
        let user = users::create_user(&pool, "dana@studio.test", &hash_api_token(&token))
            .await
            .unwrap();

        let model = build_language_model(&config.model, "test-key".to_string()).unwrap();
        let gmail = Arc::new(GmailClient::new(&config.mailbox).unwrap());
        let state = AppState::new(pool, gmail, model, &config);

        Self {
            state,
            model_server,
            gmail_server,
            token,
            user_id: user.id,
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn connect_mailbox(&self, access_token: &str) {
        mailbox_accounts::upsert_mailbox_account(
            &self.state.db,
            self.user_id,
            mailbox_accounts::GOOGLE_PROVIDER,
            access_token,
            "refresh-1",
        )
        .await
        .unwrap();
    }

    pub async fn create_project(&self) -> Project {
        projects::create_project(&self.state.db, self.user_id, &logo_scope())
            .await
            .unwrap()
    }

    pub async fn insert_email(&self, project_id: Uuid, message_id: &str, body: &str) -> sg_common::db::Email {
        emails::insert_email(
            &self.state.db,
            project_id,
            &NewEmail {
                message_id: message_id.to_string(),
                subject: "Quick question".to_string(),
                sender: "Client <client@acmecorp.test>".to_string(),
                recipient: "dana@studio.test".to_string(),
                body: body.to_string(),
                received_at: Utc::now(),
            },
        )
        .await
        .unwrap()
        .unwrap()
    }

    /// Send a request with the test user's bearer token
    pub async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {}", self.token))
            .header("content-type", "application/json");
        send_request(self.router(), request, body).await
    }
}

pub async fn send_request(
    app: Router,
    request: axum::http::request::Builder,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let body = match body {
        Some(value) => Body::from(value.to_string()),
        None => Body::empty(),
    };

    let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

pub fn logo_scope() -> NewProject {
    NewProject {
        project_name: "Brand refresh".to_string(),
        client_name: "Acme Corp".to_string(),
        deliverables: "3 logo concepts".to_string(),
        revisions: "2 rounds".to_string(),
        timeline: "4 weeks".to_string(),
        out_of_scope: "animation work".to_string(),
    }
}

/// Anthropic Messages API response carrying `text`
pub fn anthropic_reply(text: &str) -> Value {
    json!({
        "id": "msg_test",
        "type": "message",
        "role": "assistant",
        "model": "claude-3-sonnet-20240229",
        "content": [{"type": "text", "text": text}],
        "stop_reason": "end_turn"
    })
}

/// Gmail `format=full` message with a single text/plain body
pub fn gmail_message(id: &str, subject: &str, body: &str) -> Value {
    json!({
        "id": id,
        "threadId": format!("t-{}", id),
        "internalDate": "1714564800000",
        "payload": {
            "mimeType": "text/plain",
            "headers": [
                {"name": "Subject", "value": subject},
                {"name": "From", "value": "Client <acmecorp@client.test>"},
                {"name": "To", "value": "dana@studio.test"},
                {"name": "Date", "value": "Wed, 1 May 2024 12:00:00 +0000"}
            ],
            "body": {"data": base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(body)}
        }
    })
}

pub fn gmail_list(ids: &[&str]) -> Value {
    json!({
        "messages": ids.iter().map(|id| json!({"id": id, "threadId": format!("t-{}", id)})).collect::<Vec<_>>(),
        "resultSizeEstimate": ids.len()
    })
}
