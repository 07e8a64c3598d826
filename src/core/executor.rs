//! 交互执行器接口
//!
//! 真正的页面请求 / DOM 操作由外部实现，执行器自己负责交互持续的时间。
//! 本 crate 只附带 DryRunExecutor（测试替身，不发任何网络请求）。

use std::time::Duration;

use async_trait::async_trait;

use crate::model::Interaction;

/// 执行结果：状态码与耗时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub status: u16,
    pub latency: Duration,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        (200..400).contains(&self.status)
    }
}

#[async_trait]
pub trait InteractionExecutor: Send + Sync {
    async fn execute(&self, interaction: &Interaction) -> Result<ExecutionOutcome, String>;
}

/// 测试替身：不做任何请求，等待 latency 后返回给定状态码（或给定错误）
#[derive(Debug, Clone)]
pub struct DryRunExecutor {
    result: Result<u16, String>,
    latency: Duration,
}

impl DryRunExecutor {
    pub fn new(status: u16, latency: Duration) -> Self {
        Self {
            result: Ok(status),
            latency,
        }
    }

    /// 每次执行都失败
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            result: Err(message.into()),
            latency: Duration::ZERO,
        }
    }
}

impl Default for DryRunExecutor {
    fn default() -> Self {
        Self::new(200, Duration::from_millis(50))
    }
}

#[async_trait]
impl InteractionExecutor for DryRunExecutor {
    async fn execute(&self, interaction: &Interaction) -> Result<ExecutionOutcome, String> {
        tracing::debug!(
            session_id = %interaction.session_id,
            kind = %interaction.pattern.kind(),
            x = interaction.coordinates.0,
            y = interaction.coordinates.1,
            "Dry-run interaction"
        );
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let status = self.result.clone()?;
        Ok(ExecutionOutcome {
            status,
            latency: self.latency,
        })
    }
}
