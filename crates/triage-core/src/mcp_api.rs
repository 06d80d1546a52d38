use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::history::EventId;
use crate::knowledge::KnowledgeBase;
use crate::model::{TriageLevel, TriageResponse};

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EvaluateTriageParams {
    /// Free-text description of the patient's symptoms. Emails and phone numbers are
    /// redacted before any processing.
    pub input: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AssessSymptomsParams {
    /// Free-text description of the patient's symptoms.
    pub input: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetTriageEventParams {
    /// Event id returned by `evaluate_triage`.
    pub event_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvaluateTriageResponse {
    /// Present when the decision was persisted to triage history.
    pub event_id: Option<EventId>,
    pub response: TriageResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RuleCatalogEntry {
    pub id: String,
    pub severity: TriageLevel,
    pub description: String,
    pub required_symptoms: Vec<String>,
    pub any_symptoms: Vec<String>,
    pub excluded_symptoms: Vec<String>,
    /// True for rules that are documented but never selected by the engine.
    pub excluded_from_matching: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RuleCatalogResponse {
    /// Rules in evaluation order; earlier entries take priority.
    pub rules: Vec<RuleCatalogEntry>,
}

impl RuleCatalogResponse {
    pub fn from_knowledge(knowledge: &KnowledgeBase) -> Self {
        let rules = knowledge
            .rules()
            .iter()
            .map(|rule| RuleCatalogEntry {
                id: rule.id.clone(),
                severity: rule.triage_level,
                description: rule.message.clone(),
                required_symptoms: rule.conditions.all.clone().unwrap_or_default(),
                any_symptoms: rule.conditions.any.clone().unwrap_or_default(),
                excluded_symptoms: rule.conditions.none.clone().unwrap_or_default(),
                excluded_from_matching: rule.is_excluded(),
            })
            .collect();
        Self { rules }
    }
}
