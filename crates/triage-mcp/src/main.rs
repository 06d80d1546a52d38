mod config;
mod error;
mod rate_limit;
mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{ServiceExt, transport::stdio};
use tracing::info;
use tracing_subscriber::EnvFilter;

use triage_core::audit::{
    AuditSink, AuditStatsReader, FanoutAuditSink, RedisAuditSink, TracingAuditSink,
};
use triage_core::history::TriageHistory;
use triage_core::knowledge::KnowledgeBase;
use triage_core::openai::{OpenAiClient, OpenAiClientConfig};
use triage_core::pipeline::TriagePipeline;
use triage_core::reasoning::OpenAiReasoner;
use triage_core::redis::RedisCache;

use config::Config;
use error::AppError;
use server::TriageServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for MCP JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting triage MCP server");

    let config = Config::from_env()?;
    info!(
        knowledge = %config
            .knowledge_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "embedded".to_string()),
        redis = config.redis_url.is_some(),
        reasoning_timeout_ms = config.reasoning_timeout.as_millis() as u64,
        "configuration loaded"
    );

    let knowledge = match &config.knowledge_path {
        Some(path) => KnowledgeBase::load(path).map_err(AppError::from)?,
        None => KnowledgeBase::embedded().map_err(AppError::from)?,
    };
    info!(
        crisis_keywords = knowledge.crisis_keywords().len(),
        symptoms = knowledge.symptoms().len(),
        rules = knowledge.rules().len(),
        "knowledge base loaded"
    );
    let knowledge = Arc::new(knowledge);

    // Redis is optional; without it history and counters are disabled.
    let redis_cache = RedisCache::new(config.redis_url.as_deref());
    if redis_cache.is_available().await {
        info!("redis connected");
    } else {
        info!("redis unavailable, running without history or audit counters");
    }

    let audit = FanoutAuditSink::new(vec![
        Arc::new(TracingAuditSink) as Arc<dyn AuditSink>,
        Arc::new(RedisAuditSink::new(redis_cache.clone())),
    ]);
    let mut pipeline = TriagePipeline::new(knowledge).with_audit_sink(Arc::new(audit));

    match OpenAiClientConfig::from_env() {
        Some(openai_config) => {
            info!(
                base_url = %openai_config.base_url,
                model = %config.reasoning_model,
                authenticated = openai_config.api_key.is_some(),
                "reasoning service configured"
            );
            let client = OpenAiClient::new(openai_config).map_err(AppError::from)?;
            let reasoner = OpenAiReasoner::new(client, config.reasoning_model.clone())
                .with_request_timeout(config.reasoning_timeout);
            pipeline = pipeline.with_reasoner(Arc::new(reasoner), config.reasoning_timeout);
        }
        None => info!("OPENAI_BASE_URL not set, running deterministic rules only"),
    }

    let server = TriageServer::new(
        Arc::new(pipeline),
        TriageHistory::new(redis_cache.clone(), config.history_ttl_secs),
        AuditStatsReader::new(redis_cache),
        rate_limit::RateLimiter::from_env(),
    );

    match config.http_bind {
        Some(addr) => serve_http(server, addr).await,
        None => serve_stdio(server).await,
    }
}

async fn serve_stdio(server: TriageServer) -> anyhow::Result<()> {
    info!("MCP server ready, serving on stdio");
    let service = server.serve(stdio()).await.inspect_err(|e| {
        tracing::error!(error = %e, "MCP server error");
    })?;

    service.waiting().await?;
    info!("MCP server shut down");
    Ok(())
}

async fn serve_http(server: TriageServer, addr: SocketAddr) -> anyhow::Result<()> {
    let mcp = StreamableHttpService::new(
        move || Ok(server.clone()),
        LocalSessionManager::default().into(),
        Default::default(),
    );
    let router = axum::Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .nest_service("/mcp", mcp);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "MCP server ready, serving streamable HTTP on /mcp");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    info!("MCP server shut down");
    Ok(())
}
