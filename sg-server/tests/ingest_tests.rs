//! Mail ingestion integration tests against a mocked Gmail API

mod common;

use axum::http::StatusCode;
use common::{gmail_list, gmail_message, TestApp};
use serde_json::json;
use sg_server::db::{emails, mailbox_accounts};
use sg_server::services::PipelineError;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

const LIST_PATH: &str = "/gmail/v1/users/me/messages";

fn message_path(id: &str) -> String {
    format!("{}/{}", LIST_PATH, id)
}

async fn mount_message(app: &TestApp, id: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(message_path(id)))
        .and(query_param("format", "full"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_message(id, "Logo", body)))
        .mount(&app.gmail_server)
        .await;
}

#[tokio::test]
async fn test_page_with_known_message_stores_only_new_ones() {
    let app = TestApp::new().await;
    app.connect_mailbox("access-1").await;
    let project = app.create_project().await;
    app.insert_email(project.id, "m2", "already stored").await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("q", "from:acmecorp@* OR to:acmecorp@*"))
        .and(query_param("maxResults", "50"))
        .and(header("authorization", "Bearer access-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_list(&["m1", "m2", "m3"])))
        .mount(&app.gmail_server)
        .await;
    mount_message(&app, "m1", "Can you also animate the logo?").await;
    mount_message(&app, "m3", "Looking forward to the concepts").await;
    // Known ids are skipped before their content is fetched
    Mock::given(method("GET"))
        .and(path(message_path("m2")))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&app.gmail_server)
        .await;

    let (status, body) = app
        .send("POST", "/api/emails/fetch", Some(json!({"projectId": project.id.to_string()})))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["count"], 2);
    let created: Vec<_> = body["emails"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["messageId"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(created, vec!["m1", "m3"]);
    assert_eq!(body["emails"][0]["body"], "Can you also animate the logo?");
    assert_eq!(body["emails"][0]["receivedAt"], "2024-05-01T12:00:00Z");

    let stored = emails::list_project_emails(&app.state.db, project.id).await.unwrap();
    assert_eq!(stored.len(), 3);

    // Second pass creates nothing
    let outcome = app
        .state
        .pipeline
        .fetch_new_emails(app.user_id, project.id)
        .await
        .unwrap();
    assert!(outcome.created.is_empty());
    assert_eq!(outcome.skipped_existing, 3);
}

#[tokio::test]
async fn test_failed_message_fetch_is_skipped() {
    let app = TestApp::new().await;
    app.connect_mailbox("access-1").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_list(&["m1", "m2"])))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("GET"))
        .and(path(message_path("m1")))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend error"))
        .mount(&app.gmail_server)
        .await;
    mount_message(&app, "m2", "Second message").await;

    let outcome = app
        .state
        .pipeline
        .fetch_new_emails(app.user_id, project.id)
        .await
        .unwrap();

    assert_eq!(outcome.listed, 2);
    assert_eq!(outcome.failed, 1);
    assert_eq!(outcome.created.len(), 1);
    assert_eq!(outcome.created[0].message_id, "m2");
}

#[tokio::test]
async fn test_body_is_truncated() {
    let app = TestApp::with_config(|config| config.mailbox.body_max_chars = 12).await;
    app.connect_mailbox("access-1").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_list(&["m1"])))
        .mount(&app.gmail_server)
        .await;
    mount_message(&app, "m1", "Can you also animate the logo?").await;

    let outcome = app
        .state
        .pipeline
        .fetch_new_emails(app.user_id, project.id)
        .await
        .unwrap();
    assert_eq!(outcome.created[0].body, "Can you also");
}

#[tokio::test]
async fn test_listing_failure_is_upstream_error() {
    let app = TestApp::new().await;
    app.connect_mailbox("access-1").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&app.gmail_server)
        .await;

    let (status, body) = app
        .send("POST", "/api/emails/fetch", Some(json!({"projectId": project.id.to_string()})))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["retryable"], true);
}

#[tokio::test]
async fn test_expired_token_is_refreshed_once_and_persisted() {
    let app = TestApp::new().await;
    app.connect_mailbox("stale").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_list(&["m1"])))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("GET"))
        .and(path(message_path("m1")))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_message("m1", "Logo", "Hi")))
        .mount(&app.gmail_server)
        .await;

    let outcome = app
        .state
        .pipeline
        .fetch_new_emails(app.user_id, project.id)
        .await
        .unwrap();
    assert_eq!(outcome.created.len(), 1);

    let account = mailbox_accounts::load_mailbox_account(
        &app.state.db,
        app.user_id,
        mailbox_accounts::GOOGLE_PROVIDER,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(account.access_token, "fresh");
    assert_eq!(account.refresh_token, "refresh-1");
}

#[tokio::test]
async fn test_store_failure_after_refresh_is_not_auth_expired() {
    let app = TestApp::new().await;
    app.connect_mailbox("access-1").await;
    let project = app.create_project().await;

    sqlx::query(
        "CREATE TRIGGER reject_token_update BEFORE UPDATE ON mailbox_accounts \
         BEGIN SELECT RAISE(ABORT, 'database is locked'); END",
    )
    .execute(&app.state.db)
    .await
    .unwrap();

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_list(&["m1"])))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("GET"))
        .and(path(message_path("m1")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "fresh",
            "expires_in": 3599,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&app.gmail_server)
        .await;

    let err = app
        .state
        .pipeline
        .fetch_new_emails(app.user_id, project.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::Store(_)), "unexpected error: {err:?}");
}

#[tokio::test]
async fn test_store_failure_after_refresh_keeps_monitor_running() {
    let app = TestApp::new().await;
    app.connect_mailbox("access-1").await;
    let project = app.create_project().await;

    sqlx::query(
        "CREATE TRIGGER reject_token_update BEFORE UPDATE ON mailbox_accounts \
         BEGIN SELECT RAISE(ABORT, 'database is locked'); END",
    )
    .execute(&app.state.db)
    .await
    .unwrap();

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_list(&["m1"])))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("GET"))
        .and(path(message_path("m1")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "fresh"})))
        .mount(&app.gmail_server)
        .await;

    app.state
        .monitors
        .start(
            app.state.pipeline.clone(),
            app.user_id,
            project.id,
            std::time::Duration::from_secs(3600),
        )
        .await
        .unwrap();

    let mut status = app.state.monitors.status(project.id).await;
    for _ in 0..300 {
        if status.runs >= 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        status = app.state.monitors.status(project.id).await;
    }
    assert_eq!(status.runs, 1);
    assert!(status.running);
    assert!(status.last_error.unwrap().contains("database is locked"));

    app.state.monitors.shutdown().await;
}

#[tokio::test]
async fn test_rejected_refresh_is_mailbox_auth_expired() {
    let app = TestApp::new().await;
    app.connect_mailbox("stale").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .expect(1)
        .mount(&app.gmail_server)
        .await;

    let (status, body) = app
        .send("POST", "/api/emails/fetch", Some(json!({"projectId": project.id.to_string()})))
        .await;
    assert_eq!(status, StatusCode::FAILED_DEPENDENCY);
    assert_eq!(body["error"]["code"], "MAILBOX_AUTH_EXPIRED");
}

#[tokio::test]
async fn test_expired_token_without_oauth_client_skips_refresh() {
    let app = TestApp::with_config(|config| {
        config.mailbox.client_id = None;
        config.mailbox.client_secret = None;
    })
    .await;
    app.connect_mailbox("stale").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.gmail_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.gmail_server)
        .await;

    let err = app
        .state
        .pipeline
        .fetch_new_emails(app.user_id, project.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MailboxAuthExpired));
}

#[tokio::test]
async fn test_auth_failure_mid_batch_keeps_earlier_inserts() {
    let app = TestApp::with_config(|config| {
        config.mailbox.client_id = None;
        config.mailbox.client_secret = None;
    })
    .await;
    app.connect_mailbox("access-1").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_list(&["m1", "m2"])))
        .mount(&app.gmail_server)
        .await;
    mount_message(&app, "m1", "First").await;
    Mock::given(method("GET"))
        .and(path(message_path("m2")))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.gmail_server)
        .await;

    let err = app
        .state
        .pipeline
        .fetch_new_emails(app.user_id, project.id)
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::MailboxAuthExpired));

    let stored = emails::list_project_emails(&app.state.db, project.id).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].message_id, "m1");
}

#[tokio::test]
async fn test_monitor_ingests_and_classifies() {
    let app = TestApp::new().await;
    app.connect_mailbox("access-1").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(gmail_list(&["m1"])))
        .mount(&app.gmail_server)
        .await;
    mount_message(&app, "m1", "Can you also animate the logo?").await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::anthropic_reply(
            r#"{"inScope": false, "confidence": 80, "reason": "Animation excluded"}"#,
        )))
        .mount(&app.model_server)
        .await;

    app.state
        .monitors
        .start(
            app.state.pipeline.clone(),
            app.user_id,
            project.id,
            std::time::Duration::from_secs(3600),
        )
        .await
        .unwrap();

    let mut status = app.state.monitors.status(project.id).await;
    for _ in 0..300 {
        if status.runs >= 1 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        status = app.state.monitors.status(project.id).await;
    }
    assert_eq!(status.runs, 1);
    assert_eq!(status.last_created, 1);
    assert_eq!(status.last_classified, 1);

    let stored = emails::list_project_emails(&app.state.db, project.id).await.unwrap();
    assert_eq!(stored[0].in_scope, Some(false));

    app.state.monitors.shutdown().await;
}

#[tokio::test]
async fn test_monitor_stops_on_auth_expired() {
    let app = TestApp::with_config(|config| {
        config.mailbox.client_id = None;
        config.mailbox.client_secret = None;
    })
    .await;
    app.connect_mailbox("stale").await;
    let project = app.create_project().await;

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(401))
        .mount(&app.gmail_server)
        .await;

    app.state
        .monitors
        .start(
            app.state.pipeline.clone(),
            app.user_id,
            project.id,
            std::time::Duration::from_millis(20),
        )
        .await
        .unwrap();

    let mut status = app.state.monitors.status(project.id).await;
    for _ in 0..300 {
        if !status.running {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        status = app.state.monitors.status(project.id).await;
    }
    assert!(!status.running);
    assert_eq!(status.runs, 1);
    assert!(status.last_error.is_some());
}
