//! Prompt rendering for classification and reply drafting
//!
//! Both builders are pure: identical inputs render byte-identical text.

use sg_common::db::{Email, Project};
use thiserror::Error;
use uuid::Uuid;

/// Reply drafting requested for an email that is not classified out of scope
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("Email {0} has not been classified yet")]
    NotClassified(Uuid),

    #[error("Email {0} is classified in scope; replies are only drafted for out-of-scope requests")]
    InScope(Uuid),
}

/// Render the classification prompt for one email against its project scope
pub fn build_classification_prompt(project: &Project, email: &Email) -> String {
    format!(
        r#"Here's a project scope:
- Deliverables: {deliverables}
- Revisions: {revisions}
- Timeline: {timeline}
- Out of scope: {out_of_scope}

Here's an incoming client email:
Subject: {subject}
Body:
{body}

Is this request in-scope or out-of-scope? Why?
Respond with a single JSON object and nothing else:
{{"inScope": boolean, "confidence": integer 0-100, "reason": string}}"#,
        deliverables = project.deliverables,
        revisions = project.revisions,
        timeline = project.timeline,
        out_of_scope = project.out_of_scope,
        subject = email.subject,
        body = email.body,
    )
}

/// Render the reply-drafting prompt
///
/// Only valid for emails already classified out of scope.
pub fn build_response_prompt(project: &Project, email: &Email) -> Result<String, PromptError> {
    match email.in_scope {
        None => return Err(PromptError::NotClassified(email.id)),
        Some(true) => return Err(PromptError::InScope(email.id)),
        Some(false) => {}
    }

    Ok(format!(
        r#"Generate a professional, friendly response to this out-of-scope request:
"{body}"

Keep it to 2-3 sentences. Be polite but firm. Reference the original scope.

Project scope:
- Deliverables: {deliverables}
- Out of scope: {out_of_scope}"#,
        body = email.body,
        deliverables = project.deliverables,
        out_of_scope = project.out_of_scope,
    ))
}
