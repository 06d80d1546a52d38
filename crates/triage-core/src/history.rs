use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::model::TriageResponse;
use crate::redis::RedisCache;

static EVENT_COUNTER: AtomicU64 = AtomicU64::new(0);

pub type EventId = String;

/// A finalized triage decision as handed to persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TriageEvent {
    pub id: EventId,
    pub created_at_ms: u64,
    /// Sanitized symptom text; raw input is never stored.
    pub symptoms: String,
    pub response: TriageResponse,
}

/// Redis-backed triage history with a TTL.
///
/// Written after the pipeline has returned; a failed write only logs. Symptoms are stored
/// as the sanitized text the decision was made on, never the raw input.
#[derive(Clone)]
pub struct TriageHistory {
    redis: RedisCache,
    ttl_secs: u64,
}

impl TriageHistory {
    pub fn new(redis: RedisCache, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub async fn record(&self, symptoms: &str, response: &TriageResponse) -> Option<EventId> {
        let event = TriageEvent {
            id: new_event_id(),
            created_at_ms: now_ms(),
            symptoms: symptoms.to_string(),
            response: response.clone(),
        };
        let raw = serde_json::to_string(&event)
            .inspect_err(|e| warn!(error = %e, "failed to serialize triage event"))
            .ok()?;
        if self
            .redis
            .set_with_ttl(&event_key(&event.id), &raw, self.ttl_secs)
            .await
        {
            Some(event.id)
        } else {
            None
        }
    }

    pub async fn get(&self, event_id: &str) -> Option<TriageEvent> {
        if !is_valid_event_id(event_id) {
            return None;
        }
        let raw = self.redis.get(&event_key(event_id)).await?;
        serde_json::from_str::<TriageEvent>(&raw)
            .inspect_err(|e| warn!(error = %e, event_id, "stored triage event is unreadable"))
            .ok()
    }
}

fn event_key(event_id: &str) -> String {
    format!("triage:v1:event:{event_id}")
}

fn is_valid_event_id(event_id: &str) -> bool {
    event_id.len() == 32 && event_id.bytes().all(|b| b.is_ascii_hexdigit())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0))
        .as_millis() as u64
}

fn new_event_id() -> EventId {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    let counter = EVENT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();

    let mut h = Sha256::new();
    h.update(now.as_nanos().to_le_bytes());
    h.update(pid.to_le_bytes());
    h.update(counter.to_le_bytes());
    let digest = h.finalize();
    hex_lower(&digest[..16])
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}
