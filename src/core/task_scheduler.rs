//! 会话调度：max_concurrent_sessions 信号量 + 显式准入策略
//!
//! Queue：满额时排队等待许可；Reject：满额时立即返回 FlouError::Admission。

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

use super::error::FlouError;
use crate::config::AdmissionPolicy;

#[derive(Clone)]
pub struct SessionScheduler {
    semaphore: Arc<Semaphore>,
    limit: usize,
    policy: AdmissionPolicy,
}

/// 会话许可：drop 时归还名额
pub type SessionPermit = OwnedSemaphorePermit;

impl SessionScheduler {
    pub fn new(max_concurrent_sessions: usize, policy: AdmissionPolicy) -> Self {
        let limit = max_concurrent_sessions.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            policy,
        }
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// 按策略获取许可
    pub async fn admit(&self) -> Result<SessionPermit, FlouError> {
        match self.policy {
            AdmissionPolicy::Queue => self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| FlouError::Admission("scheduler closed".to_string())),
            AdmissionPolicy::Reject => self.try_admit(),
        }
    }

    /// 不等待：有名额立即返回许可，否则拒绝
    pub fn try_admit(&self) -> Result<SessionPermit, FlouError> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => FlouError::Admission(format!(
                    "all {} session slots are busy",
                    self.limit
                )),
                TryAcquireError::Closed => FlouError::Admission("scheduler closed".to_string()),
            })
    }

    /// 关闭后排队中的请求全部被拒绝
    pub fn close(&self) {
        self.semaphore.close();
    }
}

impl Default for SessionScheduler {
    fn default() -> Self {
        Self::new(15, AdmissionPolicy::Queue)
    }
}
