//! Classification pipeline services
//!
//! Ingestion pulls client emails from the mailbox, the classifier asks a
//! language model for a verdict, and the materializer writes the result
//! back onto the stored email.

pub mod gmail_client;
pub mod llm_client;
pub mod mail_ingest;
pub mod mailbox_monitor;
pub mod pipeline;
pub mod prompts;
pub mod result_materializer;
pub mod scope_classifier;

pub use gmail_client::{GmailClient, MailboxError};
pub use llm_client::{build_language_model, LanguageModel, ModelError};
pub use mail_ingest::IngestOutcome;
pub use mailbox_monitor::{MonitorRegistry, MonitorStatus};
pub use pipeline::ScopePipeline;
pub use prompts::PromptError;
pub use scope_classifier::{ScopeClassifier, Verdict};

use thiserror::Error;

/// Failure of a pipeline operation
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Referenced project/email does not exist or is not owned by the caller
    #[error("{0} not found")]
    NotFound(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Stored mailbox credential rejected and could not be refreshed
    #[error("Mailbox authorization expired; reconnect the mailbox")]
    MailboxAuthExpired,

    #[error("Mailbox request failed: {0}")]
    Mailbox(MailboxError),

    #[error("Model request failed: {0}")]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] sg_common::Error),
}

impl From<MailboxError> for PipelineError {
    fn from(err: MailboxError) -> Self {
        match err {
            MailboxError::AuthExpired => PipelineError::MailboxAuthExpired,
            other => PipelineError::Mailbox(other),
        }
    }
}

impl From<PromptError> for PipelineError {
    fn from(err: PromptError) -> Self {
        PipelineError::PreconditionFailed(err.to_string())
    }
}
