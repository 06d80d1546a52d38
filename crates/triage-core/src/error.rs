//! Error types for the triage core.
//!
//! Only `TriageError` ever reaches a caller of the pipeline. `ReasoningError` is absorbed
//! by the pipeline and turned into the rule-based fallback, and `KnowledgeError` can only
//! happen while the knowledge base is loaded at startup.

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TriageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReasoningError {
    /// Network failure, timeout, or non-2xx response.
    #[error("reasoning service unavailable: {0}")]
    Unavailable(String),

    /// The service answered, but not with the structured verdict we asked for.
    #[error("reasoning service returned malformed output: {0}")]
    Malformed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("failed to read knowledge base {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid knowledge base document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("crisis keyword set is empty")]
    NoCrisisKeywords,

    #[error("duplicate symptom id: {0}")]
    DuplicateSymptom(String),

    #[error("symptom {0} has no patterns")]
    EmptyPatterns(String),

    #[error("duplicate rule id: {0}")]
    DuplicateRule(String),

    #[error("rule {0} has no conditions")]
    EmptyConditions(String),
}
