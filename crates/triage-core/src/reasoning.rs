//! Boundary to the probabilistic reasoning service.
//!
//! The service is asked for a JSON verdict. Its answer is parsed into a strict wire type
//! (every field required, enums closed) and then validated; any violation is reported as
//! `ReasoningError::Malformed` so the pipeline can discard the whole augmentation.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;

use crate::error::ReasoningError;
use crate::model::{Augmentation, DifferentialItem, ReasoningVerdict, TriageLevel};
use crate::openai::{
    ChatCompletionRequest, Message, OpenAiClient, OpenAiClientError, ResponseFormat,
};

pub const DEFAULT_REASONING_MODEL: &str = "llama-3.3-70b-versatile";

const SYSTEM_PROMPT: &str = "You are a clinical decision support engine. Produce a concise, \
professional clinical report for a doctor from the patient's symptom description.\n\n\
Rules:\n\
1. Use short, rigid statements. No narrative.\n\
2. Rank differential diagnoses by likelihood (High, Moderate, Low) with a specific rationale.\n\
3. Key findings state an implication, not a restated symptom (e.g. \"Exertional dyspnea -> raises cardiac concern\").\n\
4. The urgency summary is one sentence explaining why the chosen level applies.\n\n\
Respond with a single JSON object with exactly these fields:\n\
{\n\
  \"triage_level\": \"crisis\" | \"urgent\" | \"seek_care\" | \"home_care\" | \"info\",\n\
  \"message\": \"Concise summary message.\",\n\
  \"urgency_summary\": \"One sentence explaining the level.\",\n\
  \"key_findings\": [\"Finding -> Implication\"],\n\
  \"differential_diagnosis\": [{\"condition\": \"Name\", \"likelihood\": \"High\" | \"Moderate\" | \"Low\", \"rationale\": \"Supporting features\"}],\n\
  \"suggested_focus\": [\"Area\"],\n\
  \"follow_up_questions\": [\"Question\"],\n\
  \"matched_symptoms\": [\"symptom\"]\n\
}";

/// An external service that turns sanitized symptom text into a structured verdict.
///
/// Implementations make a single attempt; the pipeline bounds the call with its own timeout
/// and drops the future when that expires.
pub trait ReasoningService: Send + Sync {
    fn augment<'a>(
        &'a self,
        safe_text: &'a str,
    ) -> BoxFuture<'a, Result<ReasoningVerdict, ReasoningError>>;
}

#[derive(Debug, Deserialize)]
struct WireVerdict {
    triage_level: TriageLevel,
    message: String,
    matched_symptoms: Vec<String>,
    urgency_summary: String,
    key_findings: Vec<String>,
    differential_diagnosis: Vec<DifferentialItem>,
    suggested_focus: Vec<String>,
    follow_up_questions: Vec<String>,
}

/// Parse and validate the raw text the reasoning service returned.
pub fn parse_verdict(content: &str) -> Result<ReasoningVerdict, ReasoningError> {
    let wire: WireVerdict = serde_json::from_str(content.trim())
        .map_err(|e| ReasoningError::Malformed(e.to_string()))?;

    let message = non_blank("message", wire.message)?;
    let urgency_summary = non_blank("urgency_summary", wire.urgency_summary)?;
    for item in &wire.differential_diagnosis {
        if item.condition.trim().is_empty() {
            return Err(ReasoningError::Malformed(
                "differential_diagnosis entry has an empty condition".to_string(),
            ));
        }
    }

    Ok(ReasoningVerdict {
        triage_level: wire.triage_level,
        message,
        matched_symptoms: wire.matched_symptoms,
        augmentation: Augmentation {
            urgency_summary,
            key_findings: wire.key_findings,
            differential_diagnosis: wire.differential_diagnosis,
            suggested_focus: wire.suggested_focus,
            follow_up_questions: wire.follow_up_questions,
        },
    })
}

fn non_blank(field: &str, value: String) -> Result<String, ReasoningError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ReasoningError::Malformed(format!("field `{field}` is empty")));
    }
    Ok(trimmed.to_string())
}

impl From<OpenAiClientError> for ReasoningError {
    fn from(err: OpenAiClientError) -> Self {
        match err {
            OpenAiClientError::InvalidJson(e) => ReasoningError::Malformed(e.to_string()),
            other => ReasoningError::Unavailable(other.to_string()),
        }
    }
}

/// `ReasoningService` backed by an OpenAI-compatible chat-completions endpoint in JSON mode.
pub struct OpenAiReasoner {
    client: OpenAiClient,
    model: String,
    request_timeout: Option<Duration>,
}

impl OpenAiReasoner {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            request_timeout: None,
        }
    }

    /// Per-request HTTP timeout, normally matched to the pipeline's reasoning bound.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    fn build_request(&self, safe_text: &str) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![Message::system(SYSTEM_PROMPT), Message::user(safe_text)],
            temperature: Some(0.1),
            max_tokens: None,
            response_format: Some(ResponseFormat::json_object()),
        }
    }
}

impl ReasoningService for OpenAiReasoner {
    fn augment<'a>(
        &'a self,
        safe_text: &'a str,
    ) -> BoxFuture<'a, Result<ReasoningVerdict, ReasoningError>> {
        Box::pin(async move {
            let request = self.build_request(safe_text);
            let response = self
                .client
                .chat_completions(&request, self.request_timeout)
                .await?;
            let content = response.first_content().ok_or_else(|| {
                ReasoningError::Malformed("missing choices[0].message.content".to_string())
            })?;
            parse_verdict(content)
        })
    }
}
