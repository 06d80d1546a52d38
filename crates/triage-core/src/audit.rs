//! Audit and telemetry sinks.
//!
//! The pipeline hands every finalized decision to an injected `AuditSink`. Sinks are
//! fire-and-forget: `record` must return immediately and never fail the response path.
//! Counters persisted by `RedisAuditSink` are read back by `AuditStatsReader`.

use std::collections::BTreeMap;
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::model::{ResponsePath, TriageLevel};
use crate::redis::RedisCache;

const AUDIT_HASH_KEY: &str = "triage:v1:audit";

/// What happened to the reasoning-service attempt for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningOutcome {
    /// Crisis short-circuit; the service was never consulted.
    Skipped,
    NotConfigured,
    Accepted,
    Unavailable,
    TimedOut,
    Malformed,
    /// Well-formed, but would have downgraded a rule-engine crisis determination.
    Contradicted,
}

impl ReasoningOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ReasoningOutcome::Skipped => "skipped",
            ReasoningOutcome::NotConfigured => "not_configured",
            ReasoningOutcome::Accepted => "accepted",
            ReasoningOutcome::Unavailable => "unavailable",
            ReasoningOutcome::TimedOut => "timed_out",
            ReasoningOutcome::Malformed => "malformed",
            ReasoningOutcome::Contradicted => "contradicted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEvent {
    pub version: ResponsePath,
    pub triage_level: TriageLevel,
    pub matched_rule_ids: Vec<String>,
    pub reasoning: ReasoningOutcome,
    pub latency_ms: u64,
    /// Truncated SHA-256 of the sanitized input; never the text itself.
    pub input_fingerprint: String,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Stable, non-reversible identifier for a piece of text, for correlating log lines.
pub fn fingerprint(text: &str) -> String {
    let hash = Sha256::digest(text.as_bytes());
    let mut hex = format!("{:x}", hash);
    hex.truncate(16);
    hex
}

/// Emits one structured log line per decision.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        info!(
            version = event.version.as_str(),
            triage_level = event.triage_level.as_str(),
            matched_rules = ?event.matched_rule_ids,
            reasoning = event.reasoning.as_str(),
            latency_ms = event.latency_ms,
            input = %event.input_fingerprint,
            "triage decision"
        );
    }
}

/// Increments per-path, per-level, per-rule and per-outcome counters in a Redis hash.
///
/// Writes happen on a spawned task; outside a Tokio runtime the event is dropped.
#[derive(Clone)]
pub struct RedisAuditSink {
    redis: RedisCache,
}

impl RedisAuditSink {
    pub fn new(redis: RedisCache) -> Self {
        Self { redis }
    }
}

impl AuditSink for RedisAuditSink {
    fn record(&self, event: &AuditEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime, audit counters not recorded");
            return;
        };

        let mut fields = vec![
            format!("requests:{}", event.version.as_str()),
            format!("level:{}", event.triage_level.as_str()),
            format!("reasoning:{}", event.reasoning.as_str()),
        ];
        fields.extend(event.matched_rule_ids.iter().map(|id| format!("rule:{id}")));

        let redis = self.redis.clone();
        handle.spawn(async move {
            for field in fields {
                let _ = redis.hincr_by(AUDIT_HASH_KEY, &field, 1).await;
            }
        });
    }
}

/// Forwards each event to every inner sink, in order.
#[derive(Clone, Default)]
pub struct FanoutAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl FanoutAuditSink {
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        Self { sinks }
    }
}

impl AuditSink for FanoutAuditSink {
    fn record(&self, event: &AuditEvent) {
        for sink in &self.sinks {
            sink.record(event);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Counter {
    pub key: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct TriageStats {
    pub by_path: Vec<Counter>,
    pub by_level: Vec<Counter>,
    pub by_rule: Vec<Counter>,
    pub by_reasoning_outcome: Vec<Counter>,
    pub redis_available: bool,
}

#[derive(Clone)]
pub struct AuditStatsReader {
    redis: RedisCache,
}

impl AuditStatsReader {
    pub fn new(redis: RedisCache) -> Self {
        Self { redis }
    }

    pub async fn get_stats(&self) -> TriageStats {
        let redis_available = self.redis.is_available().await;
        let Some(entries) = self.redis.hgetall(AUDIT_HASH_KEY).await else {
            return TriageStats {
                redis_available,
                ..Default::default()
            };
        };
        let mut stats = stats_from_fields(entries);
        stats.redis_available = redis_available;
        stats
    }
}

fn stats_from_fields(entries: impl IntoIterator<Item = (String, String)>) -> TriageStats {
    let mut groups: BTreeMap<&'static str, BTreeMap<String, u64>> = BTreeMap::new();

    for (field, value) in entries {
        let Some((kind, key)) = field.split_once(':') else {
            continue;
        };
        let group = match kind {
            "requests" => "path",
            "level" => "level",
            "rule" => "rule",
            "reasoning" => "reasoning",
            _ => continue,
        };
        let count = value.parse::<u64>().unwrap_or(0);
        groups
            .entry(group)
            .or_default()
            .insert(key.to_string(), count);
    }

    let mut take = |group: &str| -> Vec<Counter> {
        groups
            .remove(group)
            .unwrap_or_default()
            .into_iter()
            .map(|(key, count)| Counter { key, count })
            .collect()
    };

    TriageStats {
        by_path: take("path"),
        by_level: take("level"),
        by_rule: take("rule"),
        by_reasoning_outcome: take("reasoning"),
        redis_available: false,
    }
}
