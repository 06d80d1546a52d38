use triage_core::error::KnowledgeError;
use triage_core::openai::OpenAiClientError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Knowledge(#[from] KnowledgeError),

    #[error("reasoning client error: {0}")]
    Reasoning(#[from] OpenAiClientError),

    #[error("config error: {0}")]
    Config(String),
}
