//! Provider 层：行为模式生成服务的抽象、实现（OpenAI 兼容 / 通用 HTTP / Scripted）与带重试回退的客户端

pub mod backoff;
pub mod client;
pub mod http;
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod schema;
pub mod scripted;
pub mod traits;

pub use backoff::RetryPolicy;
pub use client::{ClientSettings, ProposeOutcome, ProviderClient};
pub use http::HttpProvider;
pub use openai::OpenAiProvider;
pub use registry::ProviderRegistry;
pub use schema::{parse_entry, parse_payload, response_schema_json, ParsedBatch};
pub use scripted::ScriptedProvider;
pub use traits::{PatternProvider, ProviderError, ProviderRequest, ProviderResponse, RecentPattern};
