//! Decision orchestrator.
//!
//! Sanitize, short-circuit on crisis keywords, run the rule engine, then optionally ask the
//! reasoning service for an augmentation under a hard timeout. Reasoning failures of any
//! kind degrade to the rule-engine answer; the only error a caller can see is invalid input.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::audit::{fingerprint, AuditEvent, AuditSink, ReasoningOutcome, TracingAuditSink};
use crate::error::{ReasoningError, TriageError};
use crate::knowledge::KnowledgeBase;
use crate::model::{
    AssessmentResult, AssessmentStatus, ReasoningVerdict, ResponsePath, SanitizationResult,
    TriageLevel, TriageResponse,
};
use crate::reasoning::ReasoningService;
use crate::rule_engine::RuleEngine;
use crate::sanitizer::Sanitizer;

pub const DEFAULT_REASONING_TIMEOUT: Duration = Duration::from_secs(8);

pub const CRISIS_MESSAGE: &str = "CRITICAL: Your input indicates a potential medical emergency. \
Seek immediate care.";
pub const CRISIS_DISCLAIMER: &str =
    "Call your local emergency number (911 / 112) immediately.";
pub const FALLBACK_DISCLAIMER: &str = "Rule-based result. Consult a doctor.";
pub const AUGMENTED_DISCLAIMER: &str =
    "Generated by AI. Not a diagnosis. Verify with a professional.";

/// Rule id reported by the deterministic-only path when crisis keywords short-circuit.
pub const CRISIS_RULE_ID: &str = "CRITICAL_KEYWORD_MATCH";

/// A finalized response together with the sanitized input it was decided on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluatedTriage {
    pub safe_text: String,
    pub response: TriageResponse,
}

pub struct TriagePipeline {
    knowledge: Arc<KnowledgeBase>,
    sanitizer: Sanitizer,
    rules: RuleEngine,
    reasoner: Option<Arc<dyn ReasoningService>>,
    reasoning_timeout: Duration,
    audit: Arc<dyn AuditSink>,
}

impl TriagePipeline {
    /// A deterministic pipeline: no reasoning service, decisions logged via `tracing`.
    pub fn new(knowledge: Arc<KnowledgeBase>) -> Self {
        Self {
            sanitizer: Sanitizer::new(knowledge.crisis_keywords()),
            rules: RuleEngine::new(Arc::clone(&knowledge)),
            knowledge,
            reasoner: None,
            reasoning_timeout: DEFAULT_REASONING_TIMEOUT,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_reasoner(mut self, reasoner: Arc<dyn ReasoningService>, timeout: Duration) -> Self {
        self.reasoner = Some(reasoner);
        self.reasoning_timeout = timeout;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn knowledge(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn sanitize(&self, raw_text: &str) -> SanitizationResult {
        self.sanitizer.sanitize_and_analyze(raw_text)
    }

    /// Deterministic assessment only: crisis keywords, then rules. Never calls out.
    pub fn assess_deterministic(&self, raw_text: &str) -> Result<AssessmentResult, TriageError> {
        validate_input(raw_text)?;
        let sanitized = self.sanitize(raw_text);
        if sanitized.has_crisis_keywords {
            return Ok(AssessmentResult {
                status: AssessmentStatus::Success,
                triage_level: TriageLevel::Crisis,
                matched_rule_ids: vec![CRISIS_RULE_ID.to_string()],
                risk_factors: sanitized.detected_crisis_keywords,
                guidance: CRISIS_MESSAGE.to_string(),
            });
        }
        Ok(self.rules.assess(&[sanitized.safe_text]))
    }

    pub async fn evaluate_triage(&self, raw_text: &str) -> Result<TriageResponse, TriageError> {
        self.evaluate(raw_text).await.map(|evaluated| evaluated.response)
    }

    /// Full decision, also returning the redacted text it was made on.
    pub async fn evaluate(&self, raw_text: &str) -> Result<EvaluatedTriage, TriageError> {
        validate_input(raw_text)?;
        let started = Instant::now();

        let sanitized = self.sanitize(raw_text);
        let input_fingerprint = fingerprint(&sanitized.safe_text);

        if sanitized.has_crisis_keywords {
            debug!(
                input = %input_fingerprint,
                keywords = sanitized.detected_crisis_keywords.len(),
                "crisis keywords detected, short-circuiting"
            );
            let response = crisis_response(sanitized.detected_crisis_keywords);
            self.emit(&response, ReasoningOutcome::Skipped, started, input_fingerprint);
            return Ok(EvaluatedTriage {
                safe_text: sanitized.safe_text,
                response,
            });
        }

        let assessment = self.rules.assess(&[sanitized.safe_text.as_str()]);

        let (response, outcome) = match self.attempt_augmentation(&sanitized.safe_text).await {
            Ok(verdict) => {
                if contradicts_rule_safety(&assessment, &verdict) {
                    warn!(
                        rule_level = assessment.triage_level.as_str(),
                        reasoning_level = verdict.triage_level.as_str(),
                        "reasoning verdict would downgrade a crisis rule, using rule fallback"
                    );
                    (fallback_response(assessment), ReasoningOutcome::Contradicted)
                } else {
                    (augmented_response(assessment, verdict), ReasoningOutcome::Accepted)
                }
            }
            Err(outcome) => (fallback_response(assessment), outcome),
        };

        self.emit(&response, outcome, started, input_fingerprint);
        Ok(EvaluatedTriage {
            safe_text: sanitized.safe_text,
            response,
        })
    }

    /// One bounded attempt. Dropping the future on timeout cancels the outstanding request.
    async fn attempt_augmentation(
        &self,
        safe_text: &str,
    ) -> Result<ReasoningVerdict, ReasoningOutcome> {
        let Some(reasoner) = &self.reasoner else {
            return Err(ReasoningOutcome::NotConfigured);
        };

        match tokio::time::timeout(self.reasoning_timeout, reasoner.augment(safe_text)).await {
            Ok(Ok(verdict)) => Ok(verdict),
            Ok(Err(ReasoningError::Unavailable(reason))) => {
                warn!(error = %reason, "reasoning service unavailable, using rule fallback");
                Err(ReasoningOutcome::Unavailable)
            }
            Ok(Err(ReasoningError::Malformed(reason))) => {
                warn!(error = %reason, "reasoning service output rejected, using rule fallback");
                Err(ReasoningOutcome::Malformed)
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.reasoning_timeout.as_millis() as u64,
                    "reasoning service timed out, using rule fallback"
                );
                Err(ReasoningOutcome::TimedOut)
            }
        }
    }

    fn emit(
        &self,
        response: &TriageResponse,
        reasoning: ReasoningOutcome,
        started: Instant,
        input_fingerprint: String,
    ) {
        let matched_rule_ids = response
            .assessment
            .as_ref()
            .map(|a| a.matched_rule_ids.clone())
            .unwrap_or_default();
        self.audit.record(&AuditEvent {
            version: response.version,
            triage_level: response.triage_level,
            matched_rule_ids,
            reasoning,
            latency_ms: started.elapsed().as_millis() as u64,
            input_fingerprint,
        });
    }
}

fn validate_input(raw_text: &str) -> Result<(), TriageError> {
    if raw_text.trim().is_empty() {
        return Err(TriageError::InvalidInput(
            "symptom description must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// A matched crisis rule is a safety determination the reasoning service may not downgrade.
fn contradicts_rule_safety(assessment: &AssessmentResult, verdict: &ReasoningVerdict) -> bool {
    assessment.status == AssessmentStatus::Success
        && assessment.triage_level == TriageLevel::Crisis
        && assessment.triage_level.is_more_severe_than(verdict.triage_level)
}

fn crisis_response(detected_crisis_keywords: Vec<String>) -> TriageResponse {
    TriageResponse {
        version: ResponsePath::Crisis,
        triage_level: TriageLevel::Crisis,
        message: CRISIS_MESSAGE.to_string(),
        matched_symptoms: Vec::new(),
        disclaimer: CRISIS_DISCLAIMER.to_string(),
        detected_crisis_keywords,
        assessment: None,
        augmentation: None,
    }
}

fn fallback_response(assessment: AssessmentResult) -> TriageResponse {
    TriageResponse {
        version: ResponsePath::RuleFallback,
        triage_level: assessment.triage_level,
        message: assessment.guidance.clone(),
        matched_symptoms: assessment.risk_factors.clone(),
        disclaimer: FALLBACK_DISCLAIMER.to_string(),
        detected_crisis_keywords: Vec::new(),
        assessment: Some(assessment),
        augmentation: None,
    }
}

fn augmented_response(assessment: AssessmentResult, verdict: ReasoningVerdict) -> TriageResponse {
    TriageResponse {
        version: ResponsePath::Augmented,
        triage_level: verdict.triage_level,
        message: verdict.message,
        matched_symptoms: verdict.matched_symptoms,
        disclaimer: AUGMENTED_DISCLAIMER.to_string(),
        detected_crisis_keywords: Vec::new(),
        assessment: Some(assessment),
        augmentation: Some(verdict.augmentation),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use futures::future::BoxFuture;

    use super::*;
    use crate::model::{Augmentation, DifferentialItem, Likelihood};

    enum Behaviour {
        Answer(TriageLevel),
        Fail(ReasoningError),
        Hang(Duration),
    }

    struct StubReasoner {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl StubReasoner {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ReasoningService for StubReasoner {
        fn augment<'a>(
            &'a self,
            _safe_text: &'a str,
        ) -> BoxFuture<'a, Result<ReasoningVerdict, ReasoningError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                match &self.behaviour {
                    Behaviour::Answer(level) => Ok(verdict(*level)),
                    Behaviour::Fail(err) => Err(err.clone()),
                    Behaviour::Hang(delay) => {
                        tokio::time::sleep(*delay).await;
                        Ok(verdict(TriageLevel::Info))
                    }
                }
            })
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<AuditEvent>>,
    }

    impl AuditSink for RecordingSink {
        fn record(&self, event: &AuditEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn verdict(level: TriageLevel) -> ReasoningVerdict {
        ReasoningVerdict {
            triage_level: level,
            message: "AI summary".to_string(),
            matched_symptoms: vec!["fever".to_string()],
            augmentation: Augmentation {
                urgency_summary: "Because.".to_string(),
                key_findings: vec!["Fever -> infection".to_string()],
                differential_diagnosis: vec![DifferentialItem {
                    condition: "Flu".to_string(),
                    likelihood: Likelihood::Moderate,
                    rationale: "Seasonal".to_string(),
                }],
                suggested_focus: vec!["General".to_string()],
                follow_up_questions: vec!["How long?".to_string()],
            },
        }
    }

    fn knowledge() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::embedded().unwrap())
    }

    fn pipeline_with(reasoner: Arc<StubReasoner>, timeout: Duration) -> TriagePipeline {
        TriagePipeline::new(knowledge()).with_reasoner(reasoner, timeout)
    }

    #[tokio::test]
    async fn test_crisis_short_circuits_everything() {
        let reasoner = StubReasoner::new(Behaviour::Answer(TriageLevel::Info));
        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(reasoner.clone(), Duration::from_secs(1))
            .with_audit_sink(sink.clone());

        for input in [
            "I have crushing chest pain",
            "I HAVE CRUSHING CHEST PAIN",
            "my friend passed out, email me at a@b.com",
        ] {
            let response = pipeline.evaluate_triage(input).await.unwrap();
            assert_eq!(response.version, ResponsePath::Crisis);
            assert_eq!(response.triage_level, TriageLevel::Crisis);
            assert!(response.matched_symptoms.is_empty());
            assert!(response.assessment.is_none());
            assert!(response.augmentation.is_none());
            assert!(!response.detected_crisis_keywords.is_empty());
        }
        assert_eq!(reasoner.calls(), 0);

        let events = sink.events.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert!(events.iter().all(|e| e.reasoning == ReasoningOutcome::Skipped));
        assert!(events.iter().all(|e| e.matched_rule_ids.is_empty()));
    }

    #[tokio::test]
    async fn test_without_reasoner_returns_rule_fallback() {
        let sink = Arc::new(RecordingSink::default());
        let pipeline = TriagePipeline::new(knowledge()).with_audit_sink(sink.clone());

        let response = pipeline
            .evaluate_triage("High fever and a stiff neck since yesterday")
            .await
            .unwrap();
        assert_eq!(response.version, ResponsePath::RuleFallback);
        assert_eq!(response.triage_level, TriageLevel::Urgent);
        assert_eq!(response.disclaimer, FALLBACK_DISCLAIMER);
        let assessment = response.assessment.as_ref().unwrap();
        assert_eq!(assessment.matched_rule_ids, vec!["R001_Meningitis".to_string()]);
        assert_eq!(response.message, assessment.guidance);
        assert_eq!(response.matched_symptoms, assessment.risk_factors);

        let events = sink.events.lock().unwrap();
        assert_eq!(events[0].reasoning, ReasoningOutcome::NotConfigured);
        assert_eq!(events[0].matched_rule_ids, vec!["R001_Meningitis".to_string()]);
    }

    #[tokio::test]
    async fn test_augmentation_takes_precedence_and_keeps_assessment() {
        let reasoner = StubReasoner::new(Behaviour::Answer(TriageLevel::SeekCare));
        let pipeline = pipeline_with(reasoner.clone(), Duration::from_secs(1));

        let response = pipeline.evaluate_triage("dry cough and sore throat").await.unwrap();
        assert_eq!(reasoner.calls(), 1);
        assert_eq!(response.version, ResponsePath::Augmented);
        assert_eq!(response.triage_level, TriageLevel::SeekCare);
        assert_eq!(response.message, "AI summary");
        assert_eq!(response.disclaimer, AUGMENTED_DISCLAIMER);
        assert!(response.augmentation.is_some());

        let assessment = response.assessment.unwrap();
        assert_eq!(assessment.matched_rule_ids, vec!["R004_URI".to_string()]);
        assert_eq!(assessment.triage_level, TriageLevel::HomeCare);
    }

    #[tokio::test]
    async fn test_reasoning_failures_fall_back_to_rules() {
        let input = "vomiting and diarrhea all night";
        let baseline = TriagePipeline::new(knowledge())
            .evaluate_triage(input)
            .await
            .unwrap();

        for err in [
            ReasoningError::Unavailable("connection refused".to_string()),
            ReasoningError::Malformed("missing field `triage_level`".to_string()),
        ] {
            let pipeline = pipeline_with(StubReasoner::new(Behaviour::Fail(err)), Duration::from_secs(1));
            let response = pipeline.evaluate_triage(input).await.unwrap();
            assert_eq!(response, baseline);
            assert_eq!(response.version, ResponsePath::RuleFallback);
        }
    }

    #[tokio::test]
    async fn test_timeout_is_bounded_and_identical_to_rules() {
        let input = "vomiting and diarrhea all night";
        let baseline = TriagePipeline::new(knowledge())
            .evaluate_triage(input)
            .await
            .unwrap();

        let sink = Arc::new(RecordingSink::default());
        let pipeline = pipeline_with(
            StubReasoner::new(Behaviour::Hang(Duration::from_secs(30))),
            Duration::from_millis(50),
        )
        .with_audit_sink(sink.clone());

        let started = Instant::now();
        let response = pipeline.evaluate_triage(input).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50), "{elapsed:?}");
        assert!(elapsed < Duration::from_millis(300), "{elapsed:?}");
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            serde_json::to_string(&baseline).unwrap()
        );
        assert_eq!(sink.events.lock().unwrap()[0].reasoning, ReasoningOutcome::TimedOut);
    }

    #[tokio::test]
    async fn test_reasoning_cannot_downgrade_crisis_rule() {
        let reasoner = StubReasoner::new(Behaviour::Answer(TriageLevel::HomeCare));
        let sink = Arc::new(RecordingSink::default());
        let pipeline =
            pipeline_with(reasoner, Duration::from_secs(1)).with_audit_sink(sink.clone());

        let response = pipeline
            .evaluate_triage("tight chest and I am short of breath")
            .await
            .unwrap();
        assert_eq!(response.version, ResponsePath::RuleFallback);
        assert_eq!(response.triage_level, TriageLevel::Crisis);
        assert_eq!(
            response.assessment.unwrap().matched_rule_ids,
            vec!["R005_Emergency_Chest".to_string()]
        );
        assert_eq!(sink.events.lock().unwrap()[0].reasoning, ReasoningOutcome::Contradicted);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected_before_anything_runs() {
        let reasoner = StubReasoner::new(Behaviour::Answer(TriageLevel::Info));
        let sink = Arc::new(RecordingSink::default());
        let pipeline =
            pipeline_with(reasoner.clone(), Duration::from_secs(1)).with_audit_sink(sink.clone());

        for input in ["", "   \n\t"] {
            let err = pipeline.evaluate_triage(input).await.unwrap_err();
            assert!(matches!(err, TriageError::InvalidInput(_)));
        }
        assert!(pipeline.assess_deterministic("").is_err());
        assert_eq!(reasoner.calls(), 0);
        assert!(sink.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_pii_never_reaches_reasoning_or_rules() {
        struct Capturing {
            seen: Mutex<Vec<String>>,
        }
        impl ReasoningService for Capturing {
            fn augment<'a>(
                &'a self,
                safe_text: &'a str,
            ) -> BoxFuture<'a, Result<ReasoningVerdict, ReasoningError>> {
                self.seen.lock().unwrap().push(safe_text.to_string());
                Box::pin(async { Err(ReasoningError::Unavailable("offline".to_string())) })
            }
        }

        let capturing = Arc::new(Capturing {
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = TriagePipeline::new(knowledge())
            .with_reasoner(capturing.clone(), Duration::from_secs(1));
        pipeline
            .evaluate_triage("headache, call 555-123-4567 or mail jo@example.org")
            .await
            .unwrap();

        let seen = capturing.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(!seen[0].contains("555-123-4567"));
        assert!(!seen[0].contains("jo@example.org"));
    }

    #[tokio::test]
    async fn test_evaluate_returns_redacted_input_with_response() {
        let pipeline = TriagePipeline::new(knowledge());
        let raw = "dry cough and sore throat, reach me on 555-123-4567";

        let evaluated = pipeline.evaluate(raw).await.unwrap();
        assert!(!evaluated.safe_text.contains("555-123-4567"));
        assert!(evaluated.safe_text.contains(crate::sanitizer::PHONE_PLACEHOLDER));
        assert_eq!(evaluated.response, pipeline.evaluate_triage(raw).await.unwrap());

        let crisis = pipeline.evaluate("chest pain, mail a@b.com").await.unwrap();
        assert_eq!(crisis.response.version, ResponsePath::Crisis);
        assert!(crisis.safe_text.contains(crate::sanitizer::EMAIL_PLACEHOLDER));
    }

    #[test]
    fn test_deterministic_path() {
        let pipeline = TriagePipeline::new(knowledge());

        let crisis = pipeline.assess_deterministic("thinking about suicide").unwrap();
        assert_eq!(crisis.triage_level, TriageLevel::Crisis);
        assert_eq!(crisis.matched_rule_ids, vec![CRISIS_RULE_ID.to_string()]);
        assert_eq!(crisis.risk_factors, vec!["suicide".to_string()]);

        let none = pipeline.assess_deterministic("I feel a bit off today").unwrap();
        assert_eq!(none.status, AssessmentStatus::NoMatch);
        assert_eq!(none.triage_level, TriageLevel::Info);
    }
}
