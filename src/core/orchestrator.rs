//! 会话编排器：单个会话的主控循环
//!
//! Idle → Initializing → Running → Draining → Completed | Failed。
//! 每轮循环顶部先检查取消与预算；一轮 tick = 限流许可 → propose → select → realize → 执行 → 记忆 + 指标；
//! 之后按节奏休眠（与取消令牌竞争）。单次失败只计数并继续，连续失败达到阈值才进入 Failed。

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::error::FlouError;
use super::events::{EventBus, SessionEvent};
use super::executor::InteractionExecutor;
use super::pacing::Pacing;
use super::rate_limit::RateLimiter;
use super::realizer::Realizer;
use super::recovery::{RecoveryEngine, TickAction};
use super::state::{SessionPhase, SessionStatus};
use crate::memory::AdaptiveMemory;
use crate::metrics::{MetricsAggregator, SessionSummary};
use crate::model::{Interaction, SessionContext, SessionId};
use crate::provider::ProviderClient;
use crate::selector::CandidateSelector;

/// 所有会话共享的组件（由 Engine 构造一次）
pub struct SessionRuntime {
    pub client: ProviderClient,
    pub selector: CandidateSelector,
    pub realizer: Realizer,
    pub pacing: Pacing,
    pub executor: Arc<dyn InteractionExecutor>,
    pub metrics: Arc<MetricsAggregator>,
    pub limiter: Option<Arc<RateLimiter>>,
    pub events: EventBus,
    pub recovery: RecoveryEngine,
    /// 每轮向 Provider 请求的候选数（1–5）
    pub batch_size: usize,
    pub failure_delay: Duration,
}

/// 会话结束报告
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub session_id: SessionId,
    pub target: String,
    pub phase: SessionPhase,
    pub interactions: usize,
    pub summary: Option<SessionSummary>,
    pub last_error: Option<String>,
}

pub struct SessionOrchestrator {
    runtime: Arc<SessionRuntime>,
    memory: Arc<AdaptiveMemory>,
    ctx: SessionContext,
    token: CancellationToken,
    status_tx: watch::Sender<SessionStatus>,
    rng: StdRng,
    phase: SessionPhase,
    consecutive_failures: u32,
    last_error: Option<FlouError>,
}

impl SessionOrchestrator {
    pub fn new(
        runtime: Arc<SessionRuntime>,
        memory: Arc<AdaptiveMemory>,
        ctx: SessionContext,
        token: CancellationToken,
        status_tx: watch::Sender<SessionStatus>,
        rng: StdRng,
    ) -> Self {
        Self {
            runtime,
            memory,
            ctx,
            token,
            status_tx,
            rng,
            phase: SessionPhase::Idle,
            consecutive_failures: 0,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.ctx.session_id
    }

    pub async fn run(mut self) -> SessionReport {
        self.transition(SessionPhase::Initializing);
        self.runtime.metrics.begin_session(&self.ctx.session_id);
        tracing::info!(
            session_id = %self.ctx.session_id,
            target_url = %self.ctx.target,
            profile = %self.ctx.user_profile.label,
            budget_secs = self.ctx.budget.as_secs_f64(),
            "Session started"
        );
        self.transition(SessionPhase::Running);

        let started = Instant::now();
        let budget = self.ctx.budget;
        let mut failed = false;

        loop {
            if self.token.is_cancelled() {
                tracing::info!(session_id = %self.ctx.session_id, "Session cancelled");
                break;
            }
            if started.elapsed() >= budget {
                tracing::debug!(
                    session_id = %self.ctx.session_id,
                    error = %FlouError::SessionTimeout(budget),
                    "Session budget reached"
                );
                break;
            }

            let token = self.token.clone();
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                r = self.tick(budget.saturating_sub(started.elapsed())) => r,
            };

            let pause = match outcome {
                Ok(interaction) => {
                    self.consecutive_failures = 0;
                    self.publish_status();
                    self.runtime.pacing.delay(
                        interaction.pattern.kind(),
                        interaction.intensity,
                        &mut self.rng,
                    )
                }
                Err(err) => {
                    let action = self.on_failure(err);
                    if action == TickAction::Abort {
                        failed = true;
                        break;
                    }
                    self.runtime.failure_delay
                }
            };

            // 休眠不越过预算
            let pause = pause.min(budget.saturating_sub(started.elapsed()));
            if !pause.is_zero() {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::info!(session_id = %self.ctx.session_id, "Session cancelled during pause");
                        break;
                    }
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }

        self.transition(SessionPhase::Draining);
        let final_phase = if failed {
            SessionPhase::Failed
        } else {
            SessionPhase::Completed
        };
        let summary = self
            .runtime
            .metrics
            .end_session(&self.ctx.session_id, final_phase);
        self.transition(final_phase);

        let interactions = self.ctx.interaction_count();
        let failures = summary.as_ref().map_or(0, |s| s.failures);
        self.runtime.events.publish(SessionEvent::Completed {
            session_id: self.ctx.session_id.to_string(),
            phase: final_phase,
            interactions,
            failures,
        });

        if failed {
            tracing::error!(
                session_id = %self.ctx.session_id,
                interactions,
                error = self.last_error.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                "Session failed"
            );
        } else {
            tracing::info!(
                session_id = %self.ctx.session_id,
                interactions,
                failures,
                "Session completed"
            );
        }

        SessionReport {
            session_id: self.ctx.session_id.clone(),
            target: self.ctx.target.clone(),
            phase: final_phase,
            interactions,
            summary,
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    /// 单轮：成功时返回已实现并记录的交互；限流等待不超过 `remaining`
    async fn tick(&mut self, remaining: Duration) -> Result<Interaction, FlouError> {
        let rt = Arc::clone(&self.runtime);
        if let Some(limiter) = &rt.limiter {
            limiter.acquire(remaining).await?;
        }

        let outcome = rt
            .client
            .propose_detailed(
                &self.ctx.target,
                &self.ctx,
                rt.batch_size,
                Some(self.memory.as_ref()),
            )
            .await?;

        let profile = self.ctx.user_profile.clone();
        let chosen = rt
            .selector
            .select(&outcome.patterns, &self.ctx, &profile)
            .cloned()
            .ok_or(FlouError::NoCandidate)?;
        let chosen = Arc::new(chosen);

        let interaction = rt.realizer.realize(Arc::clone(&chosen), &self.ctx, &mut self.rng);
        let execution = rt
            .executor
            .execute(&interaction)
            .await
            .map_err(FlouError::Executor)?;

        self.ctx.record_interaction(chosen.kind());
        let accepted = outcome.patterns.into_iter().map(Arc::new);
        self.memory.add(accepted, outcome.insights.as_ref());
        rt.metrics.record_execution(
            &interaction,
            execution.is_success(),
            execution.latency,
            Some(execution.status),
        );
        rt.events.publish(SessionEvent::InteractionRealized {
            session_id: self.ctx.session_id.to_string(),
            kind: chosen.kind(),
            provider: outcome.provider.clone(),
            intensity: interaction.intensity,
            duration_secs: interaction.duration_secs,
            coordinates: interaction.coordinates,
        });
        tracing::debug!(
            session_id = %self.ctx.session_id,
            kind = %chosen.kind(),
            provider = %outcome.provider,
            attempts = outcome.attempts,
            status = execution.status,
            "Interaction realized"
        );
        Ok(interaction)
    }

    fn on_failure(&mut self, err: FlouError) -> TickAction {
        self.consecutive_failures += 1;
        let consecutive = self.consecutive_failures;
        let category = err.category();
        self.runtime
            .metrics
            .record_failure(&self.ctx.session_id, None, category);
        tracing::warn!(
            session_id = %self.ctx.session_id,
            provider = err.provider().unwrap_or("-"),
            attempts = err.attempts(),
            consecutive,
            category,
            error = %err,
            "Tick failed"
        );
        self.runtime.events.publish(SessionEvent::TickFailed {
            session_id: self.ctx.session_id.to_string(),
            consecutive,
            category: category.to_string(),
            error: err.to_string(),
        });
        let action = self.runtime.recovery.for_tick(&err, consecutive);
        self.last_error = Some(err);
        self.publish_status();
        action
    }

    fn transition(&mut self, next: SessionPhase) {
        let from = self.phase;
        if !from.can_transition_to(next) {
            tracing::warn!(
                session_id = %self.ctx.session_id,
                from = from.as_str(),
                to = next.as_str(),
                "Unexpected phase transition"
            );
        }
        self.phase = next;
        self.runtime.events.publish(SessionEvent::PhaseChanged {
            session_id: self.ctx.session_id.to_string(),
            from,
            to: next,
        });
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status_tx.send_modify(|s| {
            s.phase = self.phase;
            s.interactions = self.ctx.interaction_count();
            s.consecutive_failures = self.consecutive_failures;
            s.last_error = self.last_error.as_ref().map(|e| e.to_string());
        });
    }
}
