//! Provider 客户端：单 Provider 内退避重试，多 Provider 间按优先级回退
//!
//! 每次调用带硬超时，超时视为暂时性失败。响应经 schema 严格校验后，
//! 去掉低于置信度阈值或不在允许类型内的条目。开启自适应学习时，请求附带最近的记忆。

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use super::prompt::{build_prompt, PromptInput};
use super::registry::ProviderRegistry;
use super::schema::parse_payload;
use super::traits::{PatternProvider, ProviderError, ProviderRequest, RecentPattern};
use super::RetryPolicy;
use crate::config::AppConfig;
use crate::core::error::FlouError;
use crate::core::events::{EventBus, SessionEvent};
use crate::core::recovery::{ProviderAction, RecoveryEngine};
use crate::memory::AdaptiveMemory;
use crate::model::{BehaviorPattern, PatternKind, SessionContext};

/// 客户端参数（来自 [provider] 与 [selection] 段）
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub retry: RetryPolicy,
    pub request_timeout: Duration,
    pub confidence_threshold: f64,
    pub enabled_kinds: Vec<PatternKind>,
    pub adaptive_learning: bool,
    pub prime_count: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            request_timeout: Duration::from_secs(30),
            confidence_threshold: 0.7,
            enabled_kinds: PatternKind::ALL.to_vec(),
            adaptive_learning: true,
            prime_count: 50,
        }
    }
}

impl ClientSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            retry: cfg.provider.retry_policy(),
            request_timeout: cfg.provider.request_timeout(),
            confidence_threshold: cfg.provider.confidence_threshold,
            enabled_kinds: cfg.selection.enabled_kinds.clone(),
            adaptive_learning: cfg.provider.adaptive_learning,
            prime_count: cfg.provider.prime_count,
        }
    }
}

/// 一次 propose 的完整结果
#[derive(Debug, Clone)]
pub struct ProposeOutcome {
    pub patterns: Vec<BehaviorPattern>,
    pub insights: Option<Map<String, Value>>,
    /// 最终给出结果的 Provider
    pub provider: String,
    /// 该 Provider 上的尝试次数
    pub attempts: u32,
    /// schema 校验拒绝的条目数
    pub rejected: usize,
    /// 被阈值或类型过滤掉的条目数
    pub filtered: usize,
}

/// 按注册表优先级调用 Provider，返回校验、过滤后的候选
pub struct ProviderClient {
    registry: Arc<ProviderRegistry>,
    settings: ClientSettings,
    recovery: RecoveryEngine,
    events: Option<EventBus>,
}

impl ProviderClient {
    /// Provider 内的重试次数取 settings.retry.max_retries
    pub fn new(registry: Arc<ProviderRegistry>, settings: ClientSettings) -> Self {
        let recovery = RecoveryEngine::new(settings.retry.max_retries, 1);
        Self {
            registry,
            settings,
            recovery,
            events: None,
        }
    }

    /// 回退时向事件总线发布 ProviderFallback
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// 只取候选列表，见 [`ProviderClient::propose_detailed`]
    pub async fn propose(
        &self,
        target: &str,
        ctx: &SessionContext,
        desired_count: usize,
        memory: Option<&AdaptiveMemory>,
    ) -> Result<Vec<BehaviorPattern>, FlouError> {
        self.propose_detailed(target, ctx, desired_count, memory)
            .await
            .map(|outcome| outcome.patterns)
    }

    /// 依次尝试注册表中的 Provider，第一个成功响应的 Provider 给出结果
    ///
    /// 全部失败时返回 FlouError::AllProvidersFailed，其中带最后一个 Provider 的错误。
    pub async fn propose_detailed(
        &self,
        target: &str,
        ctx: &SessionContext,
        desired_count: usize,
        memory: Option<&AdaptiveMemory>,
    ) -> Result<ProposeOutcome, FlouError> {
        let providers = self.registry.providers();
        if providers.is_empty() {
            return Err(FlouError::Config("no providers registered".to_string()));
        }
        let request = self.build_request(target, ctx, desired_count, memory);

        let mut last_err: Option<FlouError> = None;
        for (index, provider) in providers.iter().enumerate() {
            match self.call_with_retry(provider.as_ref(), &request).await {
                Ok((body, attempts)) => {
                    return self.finish(provider.name(), &body, attempts);
                }
                Err(err) => {
                    if let Some(next) = providers.get(index + 1) {
                        tracing::warn!(
                            session_id = %request.session_id,
                            provider = provider.name(),
                            next = next.name(),
                            attempts = err.attempts(),
                            error = %err,
                            "Provider failed, falling back"
                        );
                        if let Some(bus) = &self.events {
                            bus.publish(SessionEvent::ProviderFallback {
                                session_id: request.session_id.clone(),
                                from: provider.name().to_string(),
                                to: next.name().to_string(),
                                reason: err.to_string(),
                            });
                        }
                    }
                    last_err = Some(err);
                }
            }
        }

        let last = last_err.unwrap_or_else(|| FlouError::Config("no providers registered".into()));
        Err(FlouError::AllProvidersFailed {
            tried: providers.len(),
            last: Box::new(last),
        })
    }

    /// 单个 Provider：最多 max_retries + 1 次尝试；返回响应体与尝试次数
    async fn call_with_retry(
        &self,
        provider: &dyn PatternProvider,
        request: &ProviderRequest,
    ) -> Result<(String, u32), FlouError> {
        let timeout = self.settings.request_timeout;
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            let result = match tokio::time::timeout(timeout, provider.generate(request)).await {
                Ok(r) => r,
                Err(_) => Err(ProviderError::Timeout(timeout)),
            };

            let err = match result {
                Ok(resp) => return Ok((resp.body, attempt)),
                Err(e) => e,
            };

            match self.recovery.for_provider(&err, attempt) {
                ProviderAction::RetryWithBackoff(n) => {
                    let delay = self.settings.retry.delay(n);
                    tracing::warn!(
                        session_id = %request.session_id,
                        provider = provider.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Provider call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                ProviderAction::Fallback => {
                    return Err(match err {
                        ProviderError::Permanent(message) => FlouError::ProviderPermanent {
                            provider: provider.name().to_string(),
                            message,
                        },
                        other => FlouError::ProviderTransient {
                            provider: provider.name().to_string(),
                            attempts: attempt,
                            message: other.to_string(),
                        },
                    });
                }
            }
        }
    }

    fn finish(&self, provider: &str, body: &str, attempts: u32) -> Result<ProposeOutcome, FlouError> {
        let batch = parse_payload(body, provider).map_err(|source| FlouError::Parse {
            provider: provider.to_string(),
            source,
        })?;
        let rejected = batch.rejected.len();
        let parsed = batch.patterns.len();

        let threshold = self.settings.confidence_threshold;
        let enabled = &self.settings.enabled_kinds;
        let patterns: Vec<BehaviorPattern> = batch
            .patterns
            .into_iter()
            .filter(|p| p.confidence() >= threshold && enabled.contains(&p.kind()))
            .collect();
        let filtered = parsed - patterns.len();

        tracing::debug!(
            provider,
            attempts,
            kept = patterns.len(),
            rejected,
            filtered,
            "Provider batch accepted"
        );
        Ok(ProposeOutcome {
            patterns,
            insights: batch.insights,
            provider: provider.to_string(),
            attempts,
            rejected,
            filtered,
        })
    }

    fn build_request(
        &self,
        target: &str,
        ctx: &SessionContext,
        desired_count: usize,
        memory: Option<&AdaptiveMemory>,
    ) -> ProviderRequest {
        let recent_patterns: Vec<RecentPattern> = match memory {
            Some(m) if self.settings.adaptive_learning => m
                .recent(self.settings.prime_count)
                .iter()
                .map(|p| RecentPattern {
                    kind: p.kind(),
                    action: p.action().to_string(),
                    confidence: p.confidence(),
                })
                .collect(),
            _ => Vec::new(),
        };

        let session_seconds = ctx.budget.as_secs();
        let prompt = build_prompt(&PromptInput {
            target,
            session_seconds,
            page_elements: &ctx.page_elements,
            enabled_kinds: &self.settings.enabled_kinds,
            desired_count,
            user_interests: ctx.user_profile.interests.iter().map(String::as_str).collect(),
            recent: &recent_patterns,
        });

        ProviderRequest {
            session_id: ctx.session_id.to_string(),
            target: target.to_string(),
            desired_count,
            session_seconds,
            interaction_count: ctx.interaction_count(),
            page_elements: ctx.page_elements.clone(),
            enabled_kinds: self.settings.enabled_kinds.clone(),
            user_profile: ctx.user_profile.clone(),
            recent_patterns,
            prompt,
        }
    }
}
