pub mod audit;
pub mod error;
pub mod history;
pub mod knowledge;
pub mod mcp_api;
pub mod model;
pub mod openai;
pub mod pipeline;
pub mod reasoning;
pub mod redis;
pub mod rule_engine;
pub mod sanitizer;
