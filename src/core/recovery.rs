//! 错误恢复引擎
//!
//! 把错误映射为动作：Provider 层决定退避重试还是切换下一个 Provider；会话层决定跳过本轮还是终止会话。

use super::error::FlouError;
use crate::provider::ProviderError;

/// 单个 Provider 调用失败后的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAction {
    /// 退避后重试同一 Provider（第 n 次重试，0 起）
    RetryWithBackoff(u32),
    /// 放弃当前 Provider，切换下一个
    Fallback,
}

/// tick 失败后的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// 记一次失败，继续循环
    SkipTick,
    /// 连续失败达到阈值，会话进入 Failed
    Abort,
}

#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    max_retries: u32,
    failure_threshold: u32,
}

impl RecoveryEngine {
    pub fn new(max_retries: u32, failure_threshold: u32) -> Self {
        Self {
            max_retries,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// `attempt` 为已经失败的尝试次数（含本次，1 起）
    pub fn for_provider(&self, err: &ProviderError, attempt: u32) -> ProviderAction {
        if err.is_retryable() && attempt <= self.max_retries {
            ProviderAction::RetryWithBackoff(attempt - 1)
        } else {
            ProviderAction::Fallback
        }
    }

    /// `consecutive` 为包含本次在内的连续失败数
    pub fn for_tick(&self, err: &FlouError, consecutive: u32) -> TickAction {
        match err {
            FlouError::Config(_) => TickAction::Abort,
            _ if consecutive >= self.failure_threshold => TickAction::Abort,
            _ => TickAction::SkipTick,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_retries_until_budget() {
        let engine = RecoveryEngine::new(3, 5);
        let err = ProviderError::Transient("503".into());
        assert_eq!(engine.for_provider(&err, 1), ProviderAction::RetryWithBackoff(0));
        assert_eq!(engine.for_provider(&err, 3), ProviderAction::RetryWithBackoff(2));
        assert_eq!(engine.for_provider(&err, 4), ProviderAction::Fallback);
        let timeout = ProviderError::Timeout(Duration::from_secs(1));
        assert_eq!(engine.for_provider(&timeout, 2), ProviderAction::RetryWithBackoff(1));
    }

    #[test]
    fn test_permanent_falls_back_immediately() {
        let engine = RecoveryEngine::new(3, 5);
        let err = ProviderError::Permanent("401".into());
        assert_eq!(engine.for_provider(&err, 1), ProviderAction::Fallback);
    }

    #[test]
    fn test_tick_threshold() {
        let engine = RecoveryEngine::new(3, 5);
        let err = FlouError::NoCandidate;
        assert_eq!(engine.for_tick(&err, 4), TickAction::SkipTick);
        assert_eq!(engine.for_tick(&err, 5), TickAction::Abort);
        assert_eq!(
            engine.for_tick(&FlouError::Config("x".into()), 1),
            TickAction::Abort
        );
    }
}
