//! 优雅关闭
//!
//! ShutdownManager 持有全局关闭令牌（Engine 的会话令牌都是它的子令牌），监听 Ctrl+C / SIGTERM；
//! ShutdownCoordinator 在会话全部排空后依次执行清理任务（带超时），如输出最终指标。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::memory::AdaptiveMemory;
use crate::metrics::MetricsAggregator;

#[derive(Clone)]
pub struct ShutdownManager {
    token: CancellationToken,
    reason_tx: broadcast::Sender<ShutdownReason>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C
    UserInitiated,
    /// SIGTERM
    Signal,
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(1);
        Self {
            token: CancellationToken::new(),
            reason_tx,
        }
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn shutdown(&self, reason: ShutdownReason) {
        let _ = self.reason_tx.send(reason);
        self.token.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ShutdownReason> {
        self.reason_tx.subscribe()
    }

    /// 安装 Ctrl+C / SIGTERM 处理器
    pub fn install_signal_handlers(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, draining sessions");
                manager.shutdown(ShutdownReason::UserInitiated);
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, draining sessions");
                    manager.shutdown(ShutdownReason::Signal);
                }
            });
        }
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// 关闭时执行的清理任务
#[async_trait::async_trait]
pub trait ShutdownCleanup: Send + Sync {
    async fn cleanup(&self) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

pub struct ShutdownCoordinator {
    manager: Arc<ShutdownManager>,
    cleanup_tasks: Vec<Arc<dyn ShutdownCleanup>>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(manager: Arc<ShutdownManager>) -> Self {
        Self {
            manager,
            cleanup_tasks: Vec::new(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register<T: ShutdownCleanup + 'static>(&mut self, task: T) {
        self.cleanup_tasks.push(Arc::new(task));
    }

    /// 依次执行；单个任务失败或超时只记日志
    pub async fn run_cleanup(&self) {
        tracing::info!(
            tasks = self.cleanup_tasks.len(),
            interrupted = self.manager.is_shutdown(),
            "Running cleanup tasks"
        );
        for task in &self.cleanup_tasks {
            let name = task.name();
            match tokio::time::timeout(self.timeout, task.cleanup()).await {
                Ok(Ok(())) => tracing::debug!(task = name, "Cleanup task completed"),
                Ok(Err(e)) => tracing::warn!(task = name, error = %e, "Cleanup task failed"),
                Err(_) => tracing::warn!(
                    task = name,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Cleanup task timed out"
                ),
            }
        }
    }
}

/// 输出全局指标汇总
pub struct MetricsReportCleanup {
    metrics: Arc<MetricsAggregator>,
}

impl MetricsReportCleanup {
    pub fn new(metrics: Arc<MetricsAggregator>) -> Self {
        Self { metrics }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for MetricsReportCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        let pruned = self.metrics.prune(chrono::Utc::now());
        let summary = self.metrics.global_summary();
        tracing::info!(
            sessions = summary.sessions_total,
            interactions = summary.interactions,
            success_rate = summary.success_rate,
            pruned,
            report = %serde_json::to_string(&summary)?,
            "Final metrics"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MetricsReport"
    }
}

/// 输出共享记忆的分析结果（仅全局记忆模式）
pub struct MemoryReportCleanup {
    memory: Arc<AdaptiveMemory>,
}

impl MemoryReportCleanup {
    pub fn new(memory: Arc<AdaptiveMemory>) -> Self {
        Self { memory }
    }
}

#[async_trait::async_trait]
impl ShutdownCleanup for MemoryReportCleanup {
    async fn cleanup(&self) -> anyhow::Result<()> {
        let analysis = self.memory.analyze();
        tracing::info!(
            patterns = analysis.total,
            average_success_rate = analysis.average_success_rate,
            kinds = ?analysis.kind_histogram,
            "Shared memory analysis"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "MemoryReport"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_shutdown_cancels_token() {
        let manager = ShutdownManager::new();
        let token = manager.token();
        let child = token.child_token();
        let mut reasons = manager.subscribe();
        assert!(!manager.is_shutdown());

        manager.shutdown(ShutdownReason::UserInitiated);
        assert!(token.is_cancelled());
        assert!(child.is_cancelled());
        assert_eq!(reasons.try_recv().unwrap(), ShutdownReason::UserInitiated);
    }

    struct Flag(Arc<AtomicBool>);

    #[async_trait::async_trait]
    impl ShutdownCleanup for Flag {
        async fn cleanup(&self) -> anyhow::Result<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Flag"
        }
    }

    struct Stuck;

    #[async_trait::async_trait]
    impl ShutdownCleanup for Stuck {
        async fn cleanup(&self) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }

        fn name(&self) -> &'static str {
            "Stuck"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_coordinator_runs_all_tasks_despite_timeout() {
        let mut coordinator = ShutdownCoordinator::new(Arc::new(ShutdownManager::new()))
            .with_timeout(Duration::from_secs(1));
        let called = Arc::new(AtomicBool::new(false));
        coordinator.register(Stuck);
        coordinator.register(Flag(called.clone()));
        coordinator.register(MetricsReportCleanup::new(Arc::new(MetricsAggregator::default())));

        coordinator.run_cleanup().await;
        assert!(called.load(Ordering::SeqCst));
    }
}
