//! sg-server library interface
//!
//! ScopeGuard classification service: ingests client emails from a
//! freelancer's mailbox, classifies each against the agreed project scope
//! with a hosted language model, and drafts replies to scope creep.

pub mod api;
pub mod db;
pub mod error;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::{middleware, Router};
use chrono::{DateTime, Utc};
use sg_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::{
    GmailClient, LanguageModel, MonitorRegistry, PipelineError, ScopeClassifier, ScopePipeline,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Classification pipeline
    pub pipeline: ScopePipeline,
    /// Running mailbox monitors
    pub monitors: MonitorRegistry,
    /// Interval for newly started monitors
    pub monitor_interval: Duration,
    /// Configured model identifier (reported by /health)
    pub model_name: String,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last upstream/internal error for diagnostics
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        gmail: Arc<GmailClient>,
        model: Arc<dyn LanguageModel>,
        config: &TomlConfig,
    ) -> Self {
        let model_name = model.model_name().to_string();
        let classifier = ScopeClassifier::new(
            model,
            config.model.classification_max_tokens,
            config.model.response_max_tokens,
        );
        let pipeline = ScopePipeline::new(db.clone(), gmail, config.mailbox.clone(), classifier);

        Self {
            db,
            pipeline,
            monitors: MonitorRegistry::new(),
            monitor_interval: config.monitor.interval(),
            model_name,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Convert a pipeline result, remembering operational failures for /health
    pub async fn track<T>(&self, result: Result<T, PipelineError>) -> ApiResult<T> {
        if let Err(
            e @ (PipelineError::Mailbox(_) | PipelineError::Model(_) | PipelineError::Store(_)),
        ) = &result
        {
            *self.last_error.write().await = Some(e.to_string());
        }
        result.map_err(ApiError::from)
    }
}

/// Build application router
///
/// `/health` is public; every `/api` route requires a bearer token.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(api::project_routes())
        .merge(api::email_routes())
        .merge(api::monitor_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth_middleware,
        ));

    Router::new()
        .merge(api::health_routes())
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
