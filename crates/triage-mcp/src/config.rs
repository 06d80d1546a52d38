use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use triage_core::pipeline::DEFAULT_REASONING_TIMEOUT;
use triage_core::reasoning::DEFAULT_REASONING_MODEL;

use crate::error::AppError;

const DEFAULT_HISTORY_TTL_SECS: u64 = 24 * 60 * 60;

/// Application configuration loaded explicitly from environment variables.
///
/// Everything is optional: with no variables set the server runs the embedded knowledge
/// base, deterministic decisions only, no Redis, on stdio. The reasoning client reads its
/// own `OPENAI_*` settings via `OpenAiClientConfig::from_env`.
#[derive(Debug, Clone)]
pub struct Config {
    /// JSON knowledge base replacing the embedded one.
    pub knowledge_path: Option<PathBuf>,
    /// Redis connection URL. `None` disables audit counters and triage history.
    pub redis_url: Option<String>,
    pub history_ttl_secs: u64,
    pub reasoning_model: String,
    /// Hard bound on one reasoning attempt.
    pub reasoning_timeout: Duration,
    /// Serve streamable HTTP on this address instead of stdio.
    pub http_bind: Option<SocketAddr>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional:
    /// - `TRIAGE_KNOWLEDGE_PATH`: knowledge base JSON file (must exist when set)
    /// - `REDIS_URL`: Redis connection string
    /// - `TRIAGE_HISTORY_TTL_SECS`: triage history retention (default 86400)
    /// - `TRIAGE_REASONING_MODEL`: model id sent to the reasoning service
    /// - `TRIAGE_REASONING_TIMEOUT_MS`: reasoning bound in milliseconds (default 8000)
    /// - `TRIAGE_HTTP_BIND`: socket address such as `127.0.0.1:8088`
    pub fn from_env() -> Result<Self, AppError> {
        let knowledge_path = non_empty_var("TRIAGE_KNOWLEDGE_PATH").map(PathBuf::from);
        if let Some(path) = &knowledge_path {
            if !path.is_file() {
                return Err(AppError::Config(format!(
                    "TRIAGE_KNOWLEDGE_PATH does not point to a file: {}",
                    path.display()
                )));
            }
        }

        let history_ttl_secs = match non_empty_var("TRIAGE_HISTORY_TTL_SECS") {
            Some(raw) => raw.parse::<u64>().ok().filter(|&n| n > 0).ok_or_else(|| {
                AppError::Config(format!("TRIAGE_HISTORY_TTL_SECS is not a positive integer: {raw}"))
            })?,
            None => DEFAULT_HISTORY_TTL_SECS,
        };

        let reasoning_timeout = match non_empty_var("TRIAGE_REASONING_TIMEOUT_MS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|&n| n > 0)
                .map(Duration::from_millis)
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "TRIAGE_REASONING_TIMEOUT_MS is not a positive integer: {raw}"
                    ))
                })?,
            None => DEFAULT_REASONING_TIMEOUT,
        };

        let http_bind = match non_empty_var("TRIAGE_HTTP_BIND") {
            Some(raw) => Some(raw.parse::<SocketAddr>().map_err(|e| {
                AppError::Config(format!("TRIAGE_HTTP_BIND is not a socket address ({raw}): {e}"))
            })?),
            None => None,
        };

        Ok(Self {
            knowledge_path,
            redis_url: non_empty_var("REDIS_URL"),
            history_ttl_secs,
            reasoning_model: non_empty_var("TRIAGE_REASONING_MODEL")
                .unwrap_or_else(|| DEFAULT_REASONING_MODEL.to_string()),
            reasoning_timeout,
            http_bind,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
