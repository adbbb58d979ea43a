//! Scope classification on top of a [`LanguageModel`]
//!
//! Transport failures from the model propagate as [`ModelError`]. Output
//! that does not contain a usable verdict is absorbed into
//! [`Verdict::degraded`] so a caller always has something to display.

use crate::services::llm_client::{LanguageModel, ModelError};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

/// Reason recorded on the fallback verdict
pub const DEGRADED_REASON: &str = "Unable to analyze email content";

/// Confidence recorded on the fallback verdict
pub const DEGRADED_CONFIDENCE: i64 = 50;

/// Structured classification result for one email
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Verdict {
    pub in_scope: bool,
    /// 0-100
    pub confidence: i64,
    pub reason: String,
    /// The model output was unusable and this is the fallback
    pub degraded: bool,
}

impl Verdict {
    /// Fallback used when model output has no usable verdict
    pub fn degraded() -> Self {
        Self {
            in_scope: false,
            confidence: DEGRADED_CONFIDENCE,
            reason: DEGRADED_REASON.to_string(),
            degraded: true,
        }
    }
}

/// Extract a verdict from free-form model output
///
/// Strips markdown code fences, parses the span from the first `{` to the
/// last `}`, and requires `inScope` (bool), `confidence` (number) and
/// `reason` (string). Anything else yields [`Verdict::degraded`].
pub fn parse_verdict(raw: &str) -> Verdict {
    match extract_verdict(raw) {
        Some(verdict) => verdict,
        None => {
            tracing::warn!(
                output_len = raw.len(),
                "Model output contained no usable verdict, using fallback"
            );
            Verdict::degraded()
        }
    }
}

fn extract_verdict(raw: &str) -> Option<Verdict> {
    let text = raw.replace("```json", "").replace("```", "");

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }

    let value: Value = serde_json::from_str(&text[start..=end]).ok()?;
    let in_scope = value.get("inScope")?.as_bool()?;
    let confidence = value.get("confidence")?.as_f64()?;
    let reason = value.get("reason")?.as_str()?;

    Some(Verdict {
        in_scope,
        confidence: confidence.round().clamp(0.0, 100.0) as i64,
        reason: reason.trim().to_string(),
        degraded: false,
    })
}

/// Classifies emails and drafts replies through a language model
#[derive(Clone)]
pub struct ScopeClassifier {
    model: Arc<dyn LanguageModel>,
    classification_max_tokens: u32,
    response_max_tokens: u32,
}

impl ScopeClassifier {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        classification_max_tokens: u32,
        response_max_tokens: u32,
    ) -> Self {
        Self {
            model,
            classification_max_tokens,
            response_max_tokens,
        }
    }

    /// Run a classification prompt and parse the verdict
    pub async fn classify(&self, prompt: &str) -> Result<Verdict, ModelError> {
        let raw = self
            .model
            .complete(prompt, self.classification_max_tokens)
            .await?;

        let verdict = parse_verdict(&raw);
        tracing::debug!(
            model = self.model.model_name(),
            in_scope = verdict.in_scope,
            confidence = verdict.confidence,
            degraded = verdict.degraded,
            "Classification complete"
        );
        Ok(verdict)
    }

    /// Run a reply-drafting prompt
    ///
    /// Returns the trimmed text; an empty completion is a malformed response.
    pub async fn draft(&self, prompt: &str) -> Result<String, ModelError> {
        let raw = self.model.complete(prompt, self.response_max_tokens).await?;
        let text = raw.trim();

        if text.is_empty() {
            return Err(ModelError::InvalidResponse(
                "model returned an empty draft".to_string(),
            ));
        }

        Ok(text.to_string())
    }
}
