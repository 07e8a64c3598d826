//! 引擎与构建器：统一的组件装配
//!
//! EngineBuilder 校验配置并构造一次所有共享组件（Provider 注册表、选择器、指标、调度器、限流器、事件总线），
//! Engine 负责按请求派生会话任务，每个会话一个 tokio task，通过 SessionHandle 停止、观察、等待结果。

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::error::FlouError;
use super::events::EventBus;
use super::executor::{DryRunExecutor, InteractionExecutor};
use super::orchestrator::{SessionOrchestrator, SessionReport, SessionRuntime};
use super::pacing::Pacing;
use super::rate_limit::RateLimiter;
use super::realizer::Realizer;
use super::recovery::RecoveryEngine;
use super::session_supervisor::SessionSupervisor;
use super::state::SessionStatus;
use super::task_scheduler::SessionScheduler;
use crate::config::{AdmissionPolicy, AppConfig, MemoryMode};
use crate::memory::AdaptiveMemory;
use crate::metrics::{GlobalSummary, MetricsAggregator, SessionSummary};
use crate::model::{resolve_profile, SessionContext, SessionId, UserProfile};
use crate::provider::{ClientSettings, ProviderClient, ProviderRegistry};
use crate::selector::{CandidateSelector, KindCategories};

/// 启动一个会话的请求
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    pub target: String,
    /// 显式画像；为空时按 profile_hint 解析预设
    pub profile: Option<UserProfile>,
    pub profile_hint: Option<String>,
    /// 覆盖配置中的会话预算
    pub budget: Option<Duration>,
}

impl SessionRequest {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.profile_hint = Some(hint.into());
        self
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = Some(budget);
        self
    }
}

/// 会话句柄：停止、观察状态、等待报告
///
/// 丢弃句柄不会停止会话；会话任务独立运行到预算耗尽或被取消。
pub struct SessionHandle {
    session_id: SessionId,
    token: CancellationToken,
    status: watch::Receiver<SessionStatus>,
    task: JoinHandle<Result<SessionReport, FlouError>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// 请求停止：会话在下一个检查点进入 Draining
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// 当前状态快照
    pub fn status(&self) -> SessionStatus {
        self.status.borrow().clone()
    }

    /// 订阅状态变化（阶段迁移、每轮成功或失败后推送）
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.clone()
    }

    /// 等待会话结束；任务 panic 或被 abort 时返回 FlouError::TaskAborted
    pub async fn join(self) -> Result<SessionReport, FlouError> {
        self.task
            .await
            .map_err(|e| FlouError::TaskAborted(e.to_string()))?
    }
}

/// 引擎构建器
pub struct EngineBuilder {
    config: AppConfig,
    registry: Option<ProviderRegistry>,
    executor: Option<Arc<dyn InteractionExecutor>>,
    shutdown: Option<CancellationToken>,
    seed: Option<u64>,
}

impl EngineBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            registry: None,
            executor: None,
            shutdown: None,
            seed: None,
        }
    }

    /// 注入 Provider 注册表；不注入时按配置构造
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 注入交互执行器；不注入时使用 DryRunExecutor
    pub fn with_executor(mut self, executor: Arc<dyn InteractionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// 全局关闭令牌：取消后所有会话进入 Draining
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    /// 覆盖 app.seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 校验配置并装配共享组件；配置不合法或注册表为空时返回 FlouError::Config
    pub fn build(self) -> Result<Engine, FlouError> {
        let config = self.config;
        config.validate()?;

        let registry = match self.registry {
            Some(r) if !r.is_empty() => r,
            Some(_) => return Err(FlouError::Config("provider registry is empty".to_string())),
            None => ProviderRegistry::from_config(&config.provider)?,
        };
        let registry = Arc::new(registry);

        let executor = self.executor.unwrap_or_else(|| {
            tracing::info!("No interaction executor supplied, using the dry-run executor");
            Arc::new(DryRunExecutor::default())
        });

        let events = EventBus::default();
        let categories = KindCategories::from_config(&config.selection);
        let metrics = Arc::new(MetricsAggregator::new(Duration::from_secs(
            config.metrics.retention_secs,
        )));
        let limiter = RateLimiter::from_config(&config.rate_limit).map(Arc::new);
        let client = ProviderClient::new(Arc::clone(&registry), ClientSettings::from_config(&config))
            .with_events(events.clone());

        let runtime = Arc::new(SessionRuntime {
            client,
            selector: CandidateSelector::new(categories.clone()),
            realizer: Realizer::from_config(&config.session),
            pacing: Pacing::new(&config.pacing, categories),
            executor,
            metrics: Arc::clone(&metrics),
            limiter,
            events: events.clone(),
            recovery: RecoveryEngine::new(
                config.provider.max_retries,
                config.session.consecutive_failure_threshold,
            ),
            batch_size: config.provider.batch_size,
            failure_delay: Duration::from_millis(config.session.failure_delay_ms),
        });

        let global_memory = match config.memory.mode {
            MemoryMode::Global => Some(Arc::new(AdaptiveMemory::new(config.memory.capacity))),
            MemoryMode::PerSession => None,
        };

        let seeds = match self.seed.or(config.app.seed) {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let scheduler = SessionScheduler::new(
            config.session.max_concurrent_sessions,
            config.session.admission,
        );
        let supervisor = SessionSupervisor::new(self.shutdown.unwrap_or_default());

        tracing::info!(
            providers = ?registry.names(),
            memory_mode = ?config.memory.mode,
            max_sessions = scheduler.limit(),
            admission = ?scheduler.policy(),
            rate_limited = runtime.limiter.is_some(),
            "Engine ready"
        );

        Ok(Engine {
            config: Arc::new(config),
            registry,
            runtime,
            metrics,
            global_memory,
            scheduler,
            supervisor: Arc::new(supervisor),
            events,
            seeds: Mutex::new(seeds),
        })
    }
}

/// 合成交互引擎：持有共享组件，派生并监管会话
pub struct Engine {
    config: Arc<AppConfig>,
    registry: Arc<ProviderRegistry>,
    runtime: Arc<SessionRuntime>,
    metrics: Arc<MetricsAggregator>,
    global_memory: Option<Arc<AdaptiveMemory>>,
    scheduler: SessionScheduler,
    supervisor: Arc<SessionSupervisor>,
    events: EventBus,
    seeds: Mutex<StdRng>,
}

impl Engine {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn metrics(&self) -> Arc<MetricsAggregator> {
        Arc::clone(&self.metrics)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// 全局记忆模式下的共享记忆
    pub fn global_memory(&self) -> Option<Arc<AdaptiveMemory>> {
        self.global_memory.clone()
    }

    /// 单个会话的指标摘要（保留期内）
    pub fn summary(&self, session_id: &SessionId) -> Option<SessionSummary> {
        self.metrics.summary(session_id)
    }

    pub fn global_summary(&self) -> GlobalSummary {
        self.metrics.global_summary()
    }

    /// 已派生且尚未结束的会话数（含排队中）
    pub fn active_sessions(&self) -> usize {
        self.supervisor.active()
    }

    /// 按 ID 停止单个会话；会话不存在或已结束时返回 false
    pub fn stop_session(&self, session_id: &SessionId) -> bool {
        self.supervisor.cancel(session_id)
    }

    /// 停止全部会话并关闭准入，之后的 spawn_session 不再开始新会话
    pub fn stop_all(&self) {
        tracing::info!(active = self.supervisor.active(), "Stopping all sessions");
        self.scheduler.close();
        self.supervisor.cancel_all();
    }

    /// 派生一个会话任务
    ///
    /// Reject 策略下满额立即返回 FlouError::Admission；Queue 策略下任务先排队，拿到许可后才开始。
    pub fn spawn_session(&self, request: SessionRequest) -> Result<SessionHandle, FlouError> {
        let target = request.target.trim().to_string();
        if target.is_empty() {
            return Err(FlouError::Config("session target must not be empty".to_string()));
        }
        let permit = match self.scheduler.policy() {
            AdmissionPolicy::Reject => Some(self.scheduler.try_admit()?),
            AdmissionPolicy::Queue => None,
        };

        let mut rng = StdRng::seed_from_u64(self.seeds.lock().gen());
        let mut profile = match request.profile {
            Some(p) => p,
            None => resolve_profile(request.profile_hint.as_deref(), &mut rng),
        };
        if let Some(level) = self.config.session.sophistication {
            profile = profile.with_sophistication(level);
        }

        let session_id = SessionId::new();
        let budget = request.budget.unwrap_or_else(|| self.config.session.budget());
        let ctx = SessionContext::new(session_id.clone(), target, budget, profile);
        let memory = self
            .global_memory
            .clone()
            .unwrap_or_else(|| Arc::new(AdaptiveMemory::new(self.config.memory.capacity)));

        let (lease, token) = self.supervisor.lease(&session_id);
        let (status_tx, status_rx) = watch::channel(SessionStatus::new(session_id.clone()));
        let orchestrator = SessionOrchestrator::new(
            Arc::clone(&self.runtime),
            memory,
            ctx,
            token.clone(),
            status_tx,
            rng,
        );

        let scheduler = self.scheduler.clone();
        let queued_token = token.clone();
        let id = session_id.clone();
        let task = tokio::spawn(async move {
            let _lease = lease;
            let permit = match permit {
                Some(p) => Ok(p),
                None => tokio::select! {
                    biased;
                    _ = queued_token.cancelled() => Err(FlouError::Cancelled),
                    p = scheduler.admit() => p,
                },
            };
            match permit {
                Ok(_permit) => Ok(orchestrator.run().await),
                Err(e) => {
                    tracing::warn!(session_id = %id, error = %e, "Session not admitted");
                    Err(e)
                }
            }
        });

        Ok(SessionHandle {
            session_id,
            token,
            status: status_rx,
            task,
        })
    }
}
