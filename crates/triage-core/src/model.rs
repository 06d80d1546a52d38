use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Categorical urgency of a case.
///
/// Variants are declared from most to least severe, so the derived ordering sorts
/// `Crisis` first. The ordering is only used for reporting, never for rule matching.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum TriageLevel {
    Crisis,
    Urgent,
    SeekCare,
    HomeCare,
    Info,
}

impl TriageLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            TriageLevel::Crisis => "crisis",
            TriageLevel::Urgent => "urgent",
            TriageLevel::SeekCare => "seek_care",
            TriageLevel::HomeCare => "home_care",
            TriageLevel::Info => "info",
        }
    }

    pub fn is_more_severe_than(self, other: TriageLevel) -> bool {
        self < other
    }
}

/// Author-assigned confidence of a rule. `Exclude` disables the rule for positive matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Critical,
    High,
    Medium,
    Low,
    Exclude,
}

/// A recognisable symptom and the lowercase substring cues that activate it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Symptom {
    pub id: String,
    pub name: String,
    pub patterns: Vec<String>,
}

/// Predicate clauses of a rule. An absent clause is vacuously satisfied.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RuleConditions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub all: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub none: Option<Vec<String>>,
}

impl RuleConditions {
    /// True when no clause lists any symptom.
    pub fn is_empty(&self) -> bool {
        [&self.all, &self.any, &self.none]
            .iter()
            .all(|clause| clause.as_ref().map_or(true, |ids| ids.is_empty()))
    }

    /// Every symptom id referenced by any clause.
    pub fn referenced_ids(&self) -> impl Iterator<Item = &str> {
        [&self.all, &self.any, &self.none]
            .into_iter()
            .flatten()
            .flatten()
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Rule {
    pub id: String,
    pub conditions: RuleConditions,
    pub triage_level: TriageLevel,
    pub message: String,
    pub confidence: Confidence,
}

impl Rule {
    pub fn is_excluded(&self) -> bool {
        self.confidence == Confidence::Exclude
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentStatus {
    Success,
    NoMatch,
}

/// Outcome of the deterministic rule engine for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AssessmentResult {
    pub status: AssessmentStatus,
    pub triage_level: TriageLevel,
    pub matched_rule_ids: Vec<String>,
    /// Active symptom ids, sorted.
    pub risk_factors: Vec<String>,
    pub guidance: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SanitizationResult {
    pub safe_text: String,
    pub has_crisis_keywords: bool,
    pub detected_crisis_keywords: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum Likelihood {
    High,
    Moderate,
    Low,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DifferentialItem {
    pub condition: String,
    pub likelihood: Likelihood,
    pub rationale: String,
}

/// Structured enrichment supplied by the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Augmentation {
    pub urgency_summary: String,
    pub key_findings: Vec<String>,
    pub differential_diagnosis: Vec<DifferentialItem>,
    pub suggested_focus: Vec<String>,
    pub follow_up_questions: Vec<String>,
}

/// A validated answer from the reasoning service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReasoningVerdict {
    pub triage_level: TriageLevel,
    pub message: String,
    pub matched_symptoms: Vec<String>,
    pub augmentation: Augmentation,
}

/// Which branch of the pipeline produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ResponsePath {
    Crisis,
    RuleFallback,
    Augmented,
}

impl ResponsePath {
    pub fn as_str(self) -> &'static str {
        match self {
            ResponsePath::Crisis => "crisis",
            ResponsePath::RuleFallback => "rule-fallback",
            ResponsePath::Augmented => "augmented",
        }
    }
}

/// Final, outward-facing triage verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TriageResponse {
    pub version: ResponsePath,
    pub triage_level: TriageLevel,
    pub message: String,
    pub matched_symptoms: Vec<String>,
    pub disclaimer: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detected_crisis_keywords: Vec<String>,
    /// Rule engine result. Absent only on the crisis path, where the engine never runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assessment: Option<AssessmentResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub augmentation: Option<Augmentation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triage_level_orders_by_descending_severity() {
        let mut levels = vec![
            TriageLevel::Info,
            TriageLevel::Crisis,
            TriageLevel::HomeCare,
            TriageLevel::Urgent,
            TriageLevel::SeekCare,
        ];
        levels.sort();
        assert_eq!(
            levels,
            vec![
                TriageLevel::Crisis,
                TriageLevel::Urgent,
                TriageLevel::SeekCare,
                TriageLevel::HomeCare,
                TriageLevel::Info,
            ]
        );
        assert!(TriageLevel::Urgent.is_more_severe_than(TriageLevel::HomeCare));
        assert!(!TriageLevel::Info.is_more_severe_than(TriageLevel::Info));
    }

    #[test]
    fn test_wire_names() {
        assert_eq!(
            serde_json::to_string(&TriageLevel::SeekCare).unwrap(),
            "\"seek_care\""
        );
        assert_eq!(
            serde_json::to_string(&ResponsePath::RuleFallback).unwrap(),
            "\"rule-fallback\""
        );
        assert_eq!(ResponsePath::RuleFallback.as_str(), "rule-fallback");
        assert_eq!(TriageLevel::HomeCare.as_str(), "home_care");
    }

    #[test]
    fn test_conditions_emptiness() {
        assert!(RuleConditions::default().is_empty());

        let only_empty_lists = RuleConditions {
            all: Some(vec![]),
            any: Some(vec![]),
            none: None,
        };
        assert!(only_empty_lists.is_empty());

        let only_none = RuleConditions {
            all: None,
            any: None,
            none: Some(vec!["fever".to_string()]),
        };
        assert!(!only_none.is_empty());
        assert_eq!(only_none.referenced_ids().collect::<Vec<_>>(), vec!["fever"]);
    }
}
