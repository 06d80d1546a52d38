//! Deterministic rule engine.
//!
//! Text fragments are mapped to a set of active symptom ids, then the ordered rules are
//! evaluated against that set. The first satisfied rule wins: rule order is priority.
//! Every function here is pure and total over arbitrary input.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::knowledge::KnowledgeBase;
use crate::model::{AssessmentResult, AssessmentStatus, Rule, RuleConditions, TriageLevel};
use crate::sanitizer::fold_for_matching;

pub const NO_MATCH_GUIDANCE: &str = "No specific deterministic pattern matched.";

#[derive(Debug, Clone)]
pub struct RuleEngine {
    knowledge: Arc<KnowledgeBase>,
}

impl RuleEngine {
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self { knowledge }
    }

    /// Activate symptoms from free-text fragments.
    ///
    /// A fragment that is exactly a symptom id activates only that symptom; otherwise every
    /// symptom with a pattern contained in the fragment is activated.
    pub fn extract_symptoms<S: AsRef<str>>(&self, fragments: &[S]) -> BTreeSet<String> {
        let mut active = BTreeSet::new();
        for fragment in fragments {
            let lower = fold_for_matching(fragment.as_ref());

            if let Some(direct) = self.knowledge.symptom(&lower) {
                active.insert(direct.id.clone());
                continue;
            }

            for symptom in self.knowledge.symptoms() {
                if symptom.patterns.iter().any(|p| lower.contains(p.as_str())) {
                    active.insert(symptom.id.clone());
                }
            }
        }
        active
    }

    /// First rule, in load order, whose predicate holds. Excluded rules are never selected.
    pub fn first_match(&self, active: &BTreeSet<String>) -> Option<&Rule> {
        self.knowledge
            .rules()
            .iter()
            .filter(|rule| !rule.is_excluded())
            .find(|rule| conditions_hold(&rule.conditions, active))
    }

    pub fn assess<S: AsRef<str>>(&self, fragments: &[S]) -> AssessmentResult {
        let active = self.extract_symptoms(fragments);

        match self.first_match(&active) {
            Some(rule) => AssessmentResult {
                status: AssessmentStatus::Success,
                triage_level: rule.triage_level,
                matched_rule_ids: vec![rule.id.clone()],
                risk_factors: active.into_iter().collect(),
                guidance: rule.message.clone(),
            },
            None => AssessmentResult {
                status: AssessmentStatus::NoMatch,
                triage_level: TriageLevel::Info,
                matched_rule_ids: Vec::new(),
                risk_factors: active.into_iter().collect(),
                guidance: NO_MATCH_GUIDANCE.to_string(),
            },
        }
    }
}

fn conditions_hold(conditions: &RuleConditions, active: &BTreeSet<String>) -> bool {
    if let Some(all) = &conditions.all {
        if !all.iter().all(|id| active.contains(id)) {
            return false;
        }
    }

    if let Some(none) = &conditions.none {
        if none.iter().any(|id| active.contains(id)) {
            return false;
        }
    }

    // A present but empty `any` clause can never be satisfied.
    if let Some(any) = &conditions.any {
        if !any.iter().any(|id| active.contains(id)) {
            return false;
        }
    }

    true
}
