//! 错误分类
//!
//! FlouError 覆盖引擎全部失败路径；ParseError 针对 Provider 返回的单条记录，整批不可用时才上升为 tick 失败。
//! 与 RecoveryEngine 配合：根据错误决定退避重试 / 切换 Provider / 跳过本轮 / 终止会话。

use std::time::Duration;

use thiserror::Error;

/// Provider 返回内容的解析错误（单条记录被拒绝，不影响同批其它记录）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload has no `behaviors` array")]
    MissingBehaviors,

    #[error("entry {index}: missing field `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("entry {index}: field `{field}` has the wrong type")]
    WrongType { index: usize, field: &'static str },

    #[error("entry {index}: unknown behavior kind `{kind}`")]
    UnknownKind { index: usize, kind: String },

    #[error("entry {index}: confidence {value} outside [0, 1]")]
    ConfidenceOutOfRange { index: usize, value: f64 },

    #[error("no usable entries in payload ({rejected} rejected)")]
    EmptyBatch { rejected: usize },
}

/// 引擎错误
#[derive(Error, Debug, Clone)]
pub enum FlouError {
    /// 构造时即失败，引擎拒绝启动
    #[error("Config error: {0}")]
    Config(String),

    #[error("Provider `{provider}` failed after {attempts} attempt(s): {message}")]
    ProviderTransient {
        provider: String,
        attempts: u32,
        message: String,
    },

    #[error("Provider `{provider}` permanent failure: {message}")]
    ProviderPermanent { provider: String, message: String },

    #[error("All {tried} provider(s) failed; last: {last}")]
    AllProvidersFailed { tried: usize, last: Box<FlouError> },

    #[error("Parse error from `{provider}`: {source}")]
    Parse {
        provider: String,
        #[source]
        source: ParseError,
    },

    #[error("No candidate pattern left after filtering")]
    NoCandidate,

    /// 软信号：预算用尽，会话正常进入 Completed
    #[error("Session budget of {0:?} exhausted")]
    SessionTimeout(Duration),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Session admission rejected: {0}")]
    Admission(String),

    #[error("Interaction executor failed: {0}")]
    Executor(String),

    #[error("Session cancelled")]
    Cancelled,

    #[error("Session task aborted: {0}")]
    TaskAborted(String),
}

impl FlouError {
    /// 错误类别名，用于指标里的错误分布
    pub fn category(&self) -> &'static str {
        match self {
            FlouError::Config(_) => "config",
            FlouError::ProviderTransient { .. } => "provider_transient",
            FlouError::ProviderPermanent { .. } => "provider_permanent",
            FlouError::AllProvidersFailed { last, .. } => last.category(),
            FlouError::Parse { .. } => "parse",
            FlouError::NoCandidate => "no_candidate",
            FlouError::SessionTimeout(_) => "session_timeout",
            FlouError::RateLimited => "rate_limited",
            FlouError::Admission(_) => "admission",
            FlouError::Executor(_) => "executor",
            FlouError::Cancelled => "cancelled",
            FlouError::TaskAborted(_) => "task_aborted",
        }
    }

    /// 产生该错误的 Provider（如有）
    pub fn provider(&self) -> Option<&str> {
        match self {
            FlouError::ProviderTransient { provider, .. }
            | FlouError::ProviderPermanent { provider, .. }
            | FlouError::Parse { provider, .. } => Some(provider),
            FlouError::AllProvidersFailed { last, .. } => last.provider(),
            _ => None,
        }
    }

    /// 累计尝试次数（仅 Provider 错误有意义）
    pub fn attempts(&self) -> u32 {
        match self {
            FlouError::ProviderTransient { attempts, .. } => *attempts,
            FlouError::ProviderPermanent { .. } | FlouError::Parse { .. } => 1,
            FlouError::AllProvidersFailed { last, .. } => last.attempts(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_providers_failed_delegates() {
        let err = FlouError::AllProvidersFailed {
            tried: 2,
            last: Box::new(FlouError::ProviderTransient {
                provider: "backup".into(),
                attempts: 4,
                message: "503".into(),
            }),
        };
        assert_eq!(err.category(), "provider_transient");
        assert_eq!(err.provider(), Some("backup"));
        assert_eq!(err.attempts(), 4);
        assert!(err.to_string().contains("backup"));
    }

    #[test]
    fn test_parse_error_display() {
        let err = FlouError::Parse {
            provider: "openai".into(),
            source: ParseError::EmptyBatch { rejected: 3 },
        };
        assert_eq!(err.category(), "parse");
        assert!(err.to_string().contains("3 rejected"));
    }
}
