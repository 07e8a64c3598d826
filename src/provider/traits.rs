//! 行为模式 Provider 抽象
//!
//! 所有后端（OpenAI 兼容 / 通用 HTTP / Scripted）实现 PatternProvider::generate：
//! 接收 ProviderRequest，返回原始响应文本，由 ProviderClient 统一做 schema 校验。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::model::{PatternKind, UserProfile};

/// 单次调用的 Provider 错误：Transient 可退避重试，Permanent 直接切换下一个 Provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 网络错误、限流、5xx
    #[error("transient: {0}")]
    Transient(String),

    /// 鉴权、配置、4xx
    #[error("permanent: {0}")]
    Permanent(String),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Permanent(_))
    }

    /// 按 HTTP 状态码分类：429 / 408 / 5xx 视为暂时性，其它 4xx 视为永久性
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {status}: {}", body.chars().take(200).collect::<String>());
        match status {
            408 | 429 | 500..=599 => ProviderError::Transient(message),
            _ => ProviderError::Permanent(message),
        }
    }
}

/// 发给 Provider 的最近记忆条目（自适应学习）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecentPattern {
    pub kind: PatternKind,
    pub action: String,
    pub confidence: f64,
}

/// Provider 请求：同一请求在所有 Provider 间复用
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRequest {
    pub session_id: String,
    pub target: String,
    pub desired_count: usize,
    pub session_seconds: u64,
    pub interaction_count: usize,
    pub page_elements: Vec<String>,
    pub enabled_kinds: Vec<PatternKind>,
    pub user_profile: UserProfile,
    /// 自适应学习开启时填充
    pub recent_patterns: Vec<RecentPattern>,
    /// 已渲染的完整提示词（LLM 类 Provider 直接使用）
    pub prompt: String,
}

/// Provider 原始响应：期望为 `{"behaviors": [...], "insights": {...}}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderResponse {
    pub body: String,
}

impl ProviderResponse {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }
}

#[async_trait]
pub trait PatternProvider: Send + Sync {
    /// 用于日志、指标与回退顺序的名称
    fn name(&self) -> &str;

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        assert!(ProviderError::from_status(429, "slow down").is_retryable());
        assert!(ProviderError::from_status(503, "").is_retryable());
        assert!(ProviderError::from_status(408, "").is_retryable());
        assert!(!ProviderError::from_status(401, "bad key").is_retryable());
        assert!(!ProviderError::from_status(404, "").is_retryable());
        assert!(ProviderError::Timeout(Duration::from_secs(1)).is_retryable());
    }
}
