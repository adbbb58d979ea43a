//! Pipeline operations exposed to the API and the mailbox monitor
//!
//! Every operation takes the caller's user id and resolves projects and
//! emails through owner-scoped queries.

use crate::db::{emails, projects};
use crate::services::gmail_client::GmailClient;
use crate::services::mail_ingest::{self, IngestOutcome};
use crate::services::prompts::{build_classification_prompt, build_response_prompt};
use crate::services::result_materializer::{apply_generated_response, apply_verdict};
use crate::services::scope_classifier::{ScopeClassifier, Verdict};
use crate::services::PipelineError;
use sg_common::config::MailboxConfig;
use sg_common::db::{Email, Project, ProjectWithEmails};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Ingest → prompt → classify → materialize
#[derive(Clone)]
pub struct ScopePipeline {
    db: SqlitePool,
    gmail: Arc<GmailClient>,
    mailbox_config: MailboxConfig,
    classifier: ScopeClassifier,
    /// Email ids with a model call in progress
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

/// Removes an email id from the in-flight set when dropped
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    email_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.email_id);
        }
    }
}

impl ScopePipeline {
    pub fn new(
        db: SqlitePool,
        gmail: Arc<GmailClient>,
        mailbox_config: MailboxConfig,
        classifier: ScopeClassifier,
    ) -> Self {
        Self {
            db,
            gmail,
            mailbox_config,
            classifier,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    /// Load a project owned by `owner`
    pub async fn load_project(&self, owner: Uuid, project_id: Uuid) -> Result<Project, PipelineError> {
        projects::load_owned_project(&self.db, owner, project_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("Project {}", project_id)))
    }

    /// Load an owned project with its emails, most recently received first
    pub async fn load_project_with_emails(
        &self,
        owner: Uuid,
        project_id: Uuid,
    ) -> Result<ProjectWithEmails, PipelineError> {
        let project = self.load_project(owner, project_id).await?;
        let emails = emails::list_project_emails(&self.db, project.id).await?;
        Ok(ProjectWithEmails { project, emails })
    }

    /// Pull unseen client emails for an owned project
    pub async fn fetch_new_emails(&self, owner: Uuid, project_id: Uuid) -> Result<IngestOutcome, PipelineError> {
        let project = self.load_project(owner, project_id).await?;
        mail_ingest::fetch_new_emails(&self.db, &self.gmail, &self.mailbox_config, &project).await
    }

    /// Classify one owned email and store the verdict
    pub async fn classify_email(&self, owner: Uuid, email_id: Uuid) -> Result<(Verdict, Email), PipelineError> {
        let _guard = self.begin(email_id)?;
        let (project, email) = self.load_email_with_project(owner, email_id).await?;

        let prompt = build_classification_prompt(&project, &email);
        let verdict = self.classifier.classify(&prompt).await?;

        if verdict.degraded {
            warn!(email_id = %email_id, "Stored fallback verdict for unparsable model output");
        }

        let updated = apply_verdict(&self.db, owner, email_id, &verdict).await?;

        info!(
            email_id = %email_id,
            project_id = %project.id,
            in_scope = verdict.in_scope,
            confidence = verdict.confidence,
            "Email classified"
        );

        Ok((verdict, updated))
    }

    /// Draft a reply for an owned email classified out of scope
    ///
    /// The model is not called unless the email is out of scope.
    pub async fn draft_response(&self, owner: Uuid, email_id: Uuid) -> Result<(String, Email), PipelineError> {
        let _guard = self.begin(email_id)?;
        let (project, email) = self.load_email_with_project(owner, email_id).await?;

        let prompt = build_response_prompt(&project, &email)?;
        let draft = self.classifier.draft(&prompt).await?;
        let updated = apply_generated_response(&self.db, owner, email_id, &draft).await?;

        info!(email_id = %email_id, project_id = %project.id, "Reply drafted");

        Ok((draft, updated))
    }

    async fn load_email_with_project(&self, owner: Uuid, email_id: Uuid) -> Result<(Project, Email), PipelineError> {
        let email = emails::load_owned_email(&self.db, owner, email_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(format!("Email {}", email_id)))?;
        let project = self.load_project(owner, email.project_id).await?;
        Ok((project, email))
    }

    fn begin(&self, email_id: Uuid) -> Result<InFlightGuard, PipelineError> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| {
                PipelineError::Store(sg_common::Error::Internal(
                    "in-flight registry poisoned".to_string(),
                ))
            })?;

        if !set.insert(email_id) {
            return Err(PipelineError::Conflict(format!(
                "Email {} is already being processed",
                email_id
            )));
        }

        Ok(InFlightGuard {
            set: self.in_flight.clone(),
            email_id,
        })
    }
}
