//! Immutable clinical knowledge base: crisis keywords, symptom patterns and ordered rules.
//!
//! Loaded once at process start (embedded default or a JSON file) and shared read-only
//! behind an `Arc`. Loading validates the document; a knowledge base that exists is valid.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::error::KnowledgeError;
use crate::model::{Rule, Symptom};
use crate::sanitizer::fold_for_matching;

const EMBEDDED_KNOWLEDGE: &str = include_str!("../data/knowledge.json");

#[derive(Debug, Deserialize)]
struct KnowledgeDocument {
    crisis_keywords: Vec<String>,
    symptoms: Vec<Symptom>,
    rules: Vec<Rule>,
}

#[derive(Debug)]
pub struct KnowledgeBase {
    crisis_keywords: Vec<String>,
    symptoms: Vec<Symptom>,
    rules: Vec<Rule>,
}

impl KnowledgeBase {
    /// The knowledge base compiled into the binary.
    pub fn embedded() -> Result<Self, KnowledgeError> {
        Self::from_json(EMBEDDED_KNOWLEDGE)
    }

    pub fn load(path: &Path) -> Result<Self, KnowledgeError> {
        let content = std::fs::read_to_string(path).map_err(|source| KnowledgeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, KnowledgeError> {
        let doc: KnowledgeDocument = serde_json::from_str(content)?;
        Self::from_parts(doc.crisis_keywords, doc.symptoms, doc.rules)
    }

    /// Validate and normalize the parts of a knowledge base.
    ///
    /// Rule order is preserved exactly; it is the evaluation priority.
    pub fn from_parts(
        crisis_keywords: Vec<String>,
        symptoms: Vec<Symptom>,
        rules: Vec<Rule>,
    ) -> Result<Self, KnowledgeError> {
        let crisis_keywords: Vec<String> = crisis_keywords
            .into_iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if crisis_keywords.is_empty() {
            return Err(KnowledgeError::NoCrisisKeywords);
        }

        let mut symptom_ids = HashSet::new();
        let mut normalized_symptoms = Vec::with_capacity(symptoms.len());
        for mut symptom in symptoms {
            symptom.id = symptom.id.trim().to_lowercase();
            if !symptom_ids.insert(symptom.id.clone()) {
                return Err(KnowledgeError::DuplicateSymptom(symptom.id));
            }
            symptom.patterns = symptom
                .patterns
                .iter()
                .map(|p| fold_for_matching(p.trim()))
                .filter(|p| !p.is_empty())
                .collect();
            if symptom.patterns.is_empty() {
                return Err(KnowledgeError::EmptyPatterns(symptom.id));
            }
            normalized_symptoms.push(symptom);
        }

        let mut rule_ids = HashSet::new();
        for rule in &rules {
            if !rule_ids.insert(rule.id.as_str()) {
                return Err(KnowledgeError::DuplicateRule(rule.id.clone()));
            }
            if rule.conditions.is_empty() {
                return Err(KnowledgeError::EmptyConditions(rule.id.clone()));
            }
            for referenced in rule.conditions.referenced_ids() {
                if !symptom_ids.contains(referenced) {
                    warn!(
                        rule = %rule.id,
                        symptom = referenced,
                        "rule references a symptom id with no patterns; clause can never be satisfied by text"
                    );
                }
            }
        }

        Ok(Self {
            crisis_keywords,
            symptoms: normalized_symptoms,
            rules,
        })
    }

    pub fn crisis_keywords(&self) -> &[String] {
        &self.crisis_keywords
    }

    pub fn symptoms(&self) -> &[Symptom] {
        &self.symptoms
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn symptom(&self, id: &str) -> Option<&Symptom> {
        self.symptoms.iter().find(|s| s.id == id)
    }
}
