//! Per-project mailbox monitor
//!
//! A repeating task that ingests new client emails and classifies each one
//! it created. One task per project; stopping cancels its token. A rejected
//! mailbox credential ends the task, any other failure is recorded and the
//! next tick runs as usual.

use crate::services::pipeline::ScopePipeline;
use crate::services::PipelineError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Monitor state reported to API consumers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorStatus {
    pub project_id: Uuid,
    pub running: bool,
    pub interval_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    /// Completed ticks since start
    pub runs: u64,
    pub last_created: usize,
    pub last_classified: usize,
    pub last_error: Option<String>,
}

impl MonitorStatus {
    fn idle(project_id: Uuid) -> Self {
        Self {
            project_id,
            running: false,
            interval_secs: 0,
            started_at: None,
            last_run_at: None,
            runs: 0,
            last_created: 0,
            last_classified: 0,
            last_error: None,
        }
    }
}

struct MonitorHandle {
    token: CancellationToken,
    status: Arc<RwLock<MonitorStatus>>,
}

/// Running monitors keyed by project id
#[derive(Clone, Default)]
pub struct MonitorRegistry {
    monitors: Arc<RwLock<HashMap<Uuid, MonitorHandle>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start monitoring a project the caller has already been verified to own
    pub async fn start(
        &self,
        pipeline: ScopePipeline,
        owner: Uuid,
        project_id: Uuid,
        interval: Duration,
    ) -> Result<MonitorStatus, PipelineError> {
        let mut monitors = self.monitors.write().await;

        if let Some(existing) = monitors.get(&project_id) {
            if existing.status.read().await.running {
                return Err(PipelineError::Conflict(format!(
                    "Monitor already running for project {}",
                    project_id
                )));
            }
        }

        let status = MonitorStatus {
            running: true,
            interval_secs: interval.as_secs(),
            started_at: Some(Utc::now()),
            ..MonitorStatus::idle(project_id)
        };
        let snapshot = status.clone();
        let status = Arc::new(RwLock::new(status));
        let token = CancellationToken::new();

        tokio::spawn(run_monitor(
            pipeline,
            owner,
            project_id,
            interval,
            token.clone(),
            status.clone(),
        ));

        monitors.insert(project_id, MonitorHandle { token, status });
        info!(project_id = %project_id, interval_secs = interval.as_secs(), "Mailbox monitor started");

        Ok(snapshot)
    }

    /// Stop a project's monitor (no-op when not running)
    pub async fn stop(&self, project_id: Uuid) -> MonitorStatus {
        let handle = self.monitors.write().await.remove(&project_id);

        match handle {
            Some(handle) => {
                handle.token.cancel();
                let mut status = handle.status.write().await;
                if status.running {
                    info!(project_id = %project_id, "Mailbox monitor stopped");
                }
                status.running = false;
                status.clone()
            }
            None => MonitorStatus::idle(project_id),
        }
    }

    pub async fn status(&self, project_id: Uuid) -> MonitorStatus {
        let monitors = self.monitors.read().await;
        match monitors.get(&project_id) {
            Some(handle) => handle.status.read().await.clone(),
            None => MonitorStatus::idle(project_id),
        }
    }

    /// Cancel every monitor (service shutdown)
    pub async fn shutdown(&self) {
        let mut monitors = self.monitors.write().await;
        for (_, handle) in monitors.drain() {
            handle.token.cancel();
        }
    }
}

async fn run_monitor(
    pipeline: ScopePipeline,
    owner: Uuid,
    project_id: Uuid,
    interval: Duration,
    token: CancellationToken,
    status: Arc<RwLock<MonitorStatus>>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = run_tick(&pipeline, owner, project_id) => result,
        };

        let mut state = status.write().await;
        state.runs += 1;
        state.last_run_at = Some(Utc::now());

        match result {
            Ok((created, classified)) => {
                state.last_created = created;
                state.last_classified = classified;
                state.last_error = None;
            }
            Err(PipelineError::MailboxAuthExpired) => {
                warn!(project_id = %project_id, "Mailbox authorization expired, stopping monitor");
                state.last_error = Some(PipelineError::MailboxAuthExpired.to_string());
                state.running = false;
                return;
            }
            Err(e) => {
                warn!(project_id = %project_id, error = %e, "Monitor tick failed");
                state.last_error = Some(e.to_string());
            }
        }
    }

    debug!(project_id = %project_id, "Monitor task cancelled");
}

/// One monitor pass: ingest, then classify what was created
///
/// Returns (emails created, emails classified).
async fn run_tick(
    pipeline: &ScopePipeline,
    owner: Uuid,
    project_id: Uuid,
) -> Result<(usize, usize), PipelineError> {
    let outcome = pipeline.fetch_new_emails(owner, project_id).await?;

    let mut classified = 0;
    for email in &outcome.created {
        match pipeline.classify_email(owner, email.id).await {
            Ok(_) => classified += 1,
            Err(e) => {
                warn!(email_id = %email.id, error = %e, "Monitor classification failed");
            }
        }
    }

    Ok((outcome.created.len(), classified))
}
