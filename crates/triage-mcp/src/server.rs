use std::sync::Arc;

use rmcp::{
    Json, ServerHandler,
    handler::server::router::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::*,
    tool, tool_handler, tool_router,
};
use tracing::debug;

use triage_core::audit::{AuditStatsReader, TriageStats};
use triage_core::history::{TriageEvent, TriageHistory};
use triage_core::mcp_api::{
    AssessSymptomsParams, EvaluateTriageParams, EvaluateTriageResponse, GetTriageEventParams,
    RuleCatalogResponse,
};
use triage_core::model::AssessmentResult;
use triage_core::pipeline::TriagePipeline;

use crate::rate_limit::RateLimiter;

#[derive(Clone)]
pub struct TriageServer {
    pipeline: Arc<TriagePipeline>,
    history: TriageHistory,
    stats: AuditStatsReader,
    limiter: Option<RateLimiter>,
    tool_router: ToolRouter<TriageServer>,
}

impl TriageServer {
    pub fn new(
        pipeline: Arc<TriagePipeline>,
        history: TriageHistory,
        stats: AuditStatsReader,
        limiter: Option<RateLimiter>,
    ) -> Self {
        Self {
            pipeline,
            history,
            stats,
            limiter,
            tool_router: Self::tool_router(),
        }
    }

    async fn gate(&self) -> Result<(), String> {
        if let Some(limiter) = &self.limiter {
            limiter.check().await?;
        }
        Ok(())
    }
}

fn require_input(input: &str) -> Result<&str, String> {
    if input.trim().is_empty() {
        return Err("input must not be empty".to_string());
    }
    Ok(input)
}

#[tool_router]
impl TriageServer {
    #[tool(description = "Triage a free-text symptom description. Redacts emails and phone numbers, short-circuits to 'crisis' on emergency keywords, applies the deterministic clinical rules, and enriches the result with AI reasoning when configured and available. The 'version' field tells which path produced the answer (crisis, rule-fallback, augmented). Not a diagnosis.")]
    async fn evaluate_triage(
        &self,
        Parameters(params): Parameters<EvaluateTriageParams>,
    ) -> Result<Json<EvaluateTriageResponse>, String> {
        self.gate().await?;
        let input = require_input(&params.input)?;

        let evaluated = self
            .pipeline
            .evaluate(input)
            .await
            .map_err(|e| e.to_string())?;
        let response = evaluated.response;

        let event_id = self.history.record(&evaluated.safe_text, &response).await;
        if event_id.is_none() {
            debug!("triage event not persisted");
        }

        Ok(Json(EvaluateTriageResponse { event_id, response }))
    }

    #[tool(description = "Deterministic-only severity assessment of a symptom description. Never calls an AI service. Emergency keywords yield triage_level 'crisis' with rule CRITICAL_KEYWORD_MATCH; otherwise the first matching clinical rule decides.")]
    async fn assess_symptom_severity(
        &self,
        Parameters(params): Parameters<AssessSymptomsParams>,
    ) -> Result<Json<AssessmentResult>, String> {
        self.gate().await?;
        let input = require_input(&params.input)?;
        let result = self
            .pipeline
            .assess_deterministic(input)
            .map_err(|e| e.to_string())?;
        Ok(Json(result))
    }

    #[tool(description = "List the clinical triage rules in evaluation order, with the symptoms each rule requires, accepts, or excludes. Earlier rules take priority.")]
    async fn get_rule_catalog(&self) -> Result<Json<RuleCatalogResponse>, String> {
        self.gate().await?;
        Ok(Json(RuleCatalogResponse::from_knowledge(
            self.pipeline.knowledge(),
        )))
    }

    #[tool(description = "Fetch a stored triage event by the event_id returned from evaluate_triage. Requires Redis; events expire after the configured TTL.")]
    async fn get_triage_event(
        &self,
        Parameters(params): Parameters<GetTriageEventParams>,
    ) -> Result<Json<TriageEvent>, String> {
        self.gate().await?;
        let event_id = params.event_id.trim();
        if event_id.is_empty() {
            return Err("event_id must not be empty".to_string());
        }
        self.history
            .get(event_id)
            .await
            .map(Json)
            .ok_or_else(|| format!("unknown or expired event_id: {event_id}"))
    }

    #[tool(description = "Get aggregated triage counters per response path, triage level, matched rule, and reasoning outcome (requires Redis).")]
    async fn get_triage_stats(&self) -> Result<Json<TriageStats>, String> {
        self.gate().await?;
        Ok(Json(self.stats.get_stats().await))
    }
}

#[tool_handler]
impl ServerHandler for TriageServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "triage-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Clinical triage decision support. Use evaluate_triage for the full decision \
(crisis check, clinical rules, optional AI enrichment) or assess_symptom_severity for the \
deterministic rules only. get_rule_catalog lists the rules in priority order. Results are \
decision support, not a diagnosis; a 'crisis' level always means contact emergency services."
                    .to_string(),
            ),
        }
    }
}
