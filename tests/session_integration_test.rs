//! 会话集成测试（暂停时钟）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flou::config::{AdmissionPolicy, AppConfig, MemoryMode, RateLimitPolicy};
use flou::core::{
    DryRunExecutor, EngineBuilder, ExecutionOutcome, FlouError, InteractionExecutor,
    SessionEvent, SessionPhase, SessionRequest,
};
use flou::model::{BehaviorStyle, Interaction, UserProfile};
use flou::provider::{PatternProvider, ProviderError, ProviderRegistry, ScriptedProvider};
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn custom_batch() -> String {
    json!({
        "behaviors": [
            {"type": "custom", "action": "hover over the logo", "confidence": 0.9}
        ],
        "insights": {"note": "integration"}
    })
    .to_string()
}

/// 节奏固定 1 秒、执行耗时 1 秒、强度不超过 0.8
fn config(budget_secs: u64) -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.session.duration_secs = budget_secs;
    cfg.session.base_intensity = 0.5;
    cfg.session.failure_delay_ms = 500;
    cfg.pacing.min_delay_secs = 1.0;
    cfg.pacing.max_delay_secs = 1.0;
    cfg.app.seed = Some(11);
    cfg
}

fn profile() -> UserProfile {
    UserProfile::new("tester", "25-34", BehaviorStyle::Normal, 3)
}

fn dynp(p: &Arc<ScriptedProvider>) -> Arc<dyn PatternProvider> {
    p.clone()
}

fn engine_with(cfg: AppConfig, providers: &[Arc<ScriptedProvider>]) -> flou::Engine {
    engine_with_executor(
        cfg,
        providers,
        Arc::new(DryRunExecutor::new(200, Duration::from_secs(1))),
    )
}

fn engine_with_executor(
    cfg: AppConfig,
    providers: &[Arc<ScriptedProvider>],
    executor: Arc<dyn InteractionExecutor>,
) -> flou::Engine {
    let registry = providers
        .iter()
        .fold(ProviderRegistry::new(), |r, p| r.with(dynp(p)));
    EngineBuilder::new(cfg)
        .with_registry(registry)
        .with_executor(executor)
        .build()
        .unwrap()
}

struct PanickingExecutor;

#[async_trait]
impl InteractionExecutor for PanickingExecutor {
    async fn execute(&self, _interaction: &Interaction) -> Result<ExecutionOutcome, String> {
        panic!("executor crashed");
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_bounds_interaction_count() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let engine = engine_with(config(10), &[provider.clone()]);

    let handle = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap();
    let report = handle.join().await.unwrap();

    assert_eq!(report.phase, SessionPhase::Completed);
    // 每轮 1 秒执行 + 1 秒间隔，10 秒预算内 5 轮
    assert_eq!(report.interactions, 5);
    assert_eq!(provider.calls(), 5);
    let summary = report.summary.unwrap();
    assert_eq!(summary.successes, 5);
    assert_eq!(summary.failures, 0);
    assert_eq!(summary.phase, Some(SessionPhase::Completed));
}

#[tokio::test(start_paused = true)]
async fn test_session_ends_at_budget_without_overshoot() {
    // 单轮最长执行 1 秒，节奏 1 秒
    for budget_secs in [3, 4, 7, 10, 13] {
        let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
        let engine = engine_with(config(budget_secs), &[provider]);
        let budget = Duration::from_secs(budget_secs);

        let start = tokio::time::Instant::now();
        let report = engine
            .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
            .unwrap()
            .join()
            .await
            .unwrap();
        let elapsed = start.elapsed();

        assert_eq!(report.phase, SessionPhase::Completed);
        assert!(elapsed >= budget, "budget {budget_secs}s ended after {elapsed:?}");
        assert!(
            elapsed <= budget + Duration::from_secs(2),
            "budget {budget_secs}s overshot to {elapsed:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_consecutive_failures_fail_session() {
    let provider = Arc::new(
        ScriptedProvider::new("broken").repeat_err(ProviderError::Permanent("401".into())),
    );
    let engine = engine_with(config(300), &[provider.clone()]);

    let report = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(report.phase, SessionPhase::Failed);
    assert_eq!(report.interactions, 0);
    assert!(report.last_error.unwrap().contains("broken"));
    // 永久错误不重试：一轮一次调用
    assert_eq!(provider.calls(), 5);
    assert_eq!(report.summary.unwrap().failures, 5);
}

#[tokio::test(start_paused = true)]
async fn test_executor_errors_fail_session() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let engine = engine_with_executor(
        config(300),
        &[provider.clone()],
        Arc::new(DryRunExecutor::failing("connection reset")),
    );

    let report = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(report.phase, SessionPhase::Failed);
    assert_eq!(report.interactions, 0);
    assert!(report.last_error.unwrap().contains("connection reset"));
    assert_eq!(provider.calls(), 5);
    let summary = report.summary.unwrap();
    assert_eq!(summary.error_histogram.get("executor"), Some(&5));
    assert_eq!(summary.successes, 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_reject_counts_as_failure() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let mut cfg = config(300);
    cfg.rate_limit.enabled = true;
    cfg.rate_limit.capacity = 1;
    cfg.rate_limit.refill_per_sec = 0.001;
    cfg.rate_limit.policy = RateLimitPolicy::Reject;
    let engine = engine_with(cfg, &[provider.clone()]);

    let report = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap()
        .join()
        .await
        .unwrap();

    // 第一轮用掉唯一的令牌，之后每轮都被拒绝
    assert_eq!(report.phase, SessionPhase::Failed);
    assert_eq!(report.interactions, 1);
    assert_eq!(provider.calls(), 1);
    let summary = report.summary.unwrap();
    assert_eq!(summary.error_histogram.get("rate_limited"), Some(&5));
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_delay_stops_at_budget() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let mut cfg = config(10);
    cfg.rate_limit.enabled = true;
    cfg.rate_limit.capacity = 1;
    cfg.rate_limit.refill_per_sec = 0.001;
    cfg.rate_limit.policy = RateLimitPolicy::Delay;
    let engine = engine_with(cfg, &[provider]);

    let start = tokio::time::Instant::now();
    let report = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap()
        .join()
        .await
        .unwrap();

    // 下一个令牌要约 1000 秒后才补上，等待在预算处截止
    assert_eq!(start.elapsed(), Duration::from_secs(10));
    assert_eq!(report.phase, SessionPhase::Completed);
    assert_eq!(report.interactions, 1);
    assert_eq!(
        report.summary.unwrap().error_histogram.get("rate_limited"),
        Some(&1)
    );
}

#[tokio::test(start_paused = true)]
async fn test_interleaved_success_resets_streak() {
    let provider = Arc::new(ScriptedProvider::new("flaky").repeat_ok(custom_batch()));
    for _ in 0..6 {
        provider
            .push_err(ProviderError::Permanent("bad gateway config".into()))
            .push_err(ProviderError::Permanent("bad gateway config".into()))
            .push_ok(custom_batch());
    }
    let mut cfg = config(30);
    cfg.session.consecutive_failure_threshold = 3;
    let engine = engine_with(cfg, &[provider]);

    let report = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(report.phase, SessionPhase::Completed);
    assert!(report.interactions >= 6);
    assert_eq!(report.summary.unwrap().error_histogram.get("provider_permanent"), Some(&12));
}

#[tokio::test(start_paused = true)]
async fn test_fallback_provider_serves_session() {
    let primary = Arc::new(
        ScriptedProvider::new("primary").repeat_err(ProviderError::Permanent("403".into())),
    );
    let backup = Arc::new(ScriptedProvider::new("backup").repeat_ok(custom_batch()));
    let engine = engine_with(config(4), &[primary.clone(), backup.clone()]);
    let mut events = engine.events().subscribe();

    let report = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap()
        .join()
        .await
        .unwrap();

    assert_eq!(report.phase, SessionPhase::Completed);
    assert_eq!(report.interactions, 2);
    assert_eq!(primary.calls(), backup.calls());
    assert_eq!(engine.global_summary().provider_usage.get("backup"), Some(&2));

    let mut fallbacks = 0;
    let mut realized_by_backup = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::ProviderFallback { from, to, .. } => {
                assert_eq!((from.as_str(), to.as_str()), ("primary", "backup"));
                fallbacks += 1;
            }
            SessionEvent::InteractionRealized { provider, .. } => {
                assert_eq!(provider, "backup");
                realized_by_backup += 1;
            }
            _ => {}
        }
    }
    assert_eq!(fallbacks, 2);
    assert_eq!(realized_by_backup, 2);
}

#[tokio::test(start_paused = true)]
async fn test_stop_drains_session() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let engine = engine_with(config(3600), &[provider]);
    let mut events = engine.events().subscribe();

    let handle = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(4500)).await;
    assert_eq!(handle.status().phase, SessionPhase::Running);
    handle.stop();
    let report = handle.join().await.unwrap();

    assert_eq!(report.phase, SessionPhase::Completed);
    assert!(report.interactions >= 2 && report.interactions <= 3);

    let mut phases = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::PhaseChanged { to, .. } = event {
            phases.push(to);
        }
    }
    assert_eq!(
        phases,
        vec![
            SessionPhase::Initializing,
            SessionPhase::Running,
            SessionPhase::Draining,
            SessionPhase::Completed
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_token_stops_all_sessions() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let shutdown = CancellationToken::new();
    let registry = ProviderRegistry::new().with(dynp(&provider));
    let engine = EngineBuilder::new(config(3600))
        .with_registry(registry)
        .with_shutdown_token(shutdown.clone())
        .build()
        .unwrap();

    let a = engine.spawn_session(SessionRequest::new("https://a.example/")).unwrap();
    let b = engine.spawn_session(SessionRequest::new("https://b.example/shop")).unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    shutdown.cancel();

    for handle in [a, b] {
        assert_eq!(handle.join().await.unwrap().phase, SessionPhase::Completed);
    }
    assert_eq!(engine.active_sessions(), 0);
    assert_eq!(engine.global_summary().sessions_active, 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_session_by_id_then_stop_all() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let engine = engine_with(config(3600), &[provider]);

    let a = engine.spawn_session(SessionRequest::new("https://a.example/")).unwrap();
    let b = engine.spawn_session(SessionRequest::new("https://b.example/")).unwrap();
    let mut b_status = b.subscribe_status();
    tokio::time::sleep(Duration::from_secs(3)).await;

    let a_id = a.session_id().clone();
    assert!(engine.stop_session(&a_id));
    assert_eq!(a.join().await.unwrap().phase, SessionPhase::Completed);
    assert!(!engine.stop_session(&a_id));
    assert_eq!(engine.active_sessions(), 1);
    assert_eq!(b_status.borrow().phase, SessionPhase::Running);

    engine.stop_all();
    let done = b_status
        .wait_for(|s| s.phase == SessionPhase::Completed)
        .await
        .unwrap()
        .clone();
    assert!(done.interactions >= 1);
    assert_eq!(b.join().await.unwrap().phase, SessionPhase::Completed);
    assert_eq!(engine.active_sessions(), 0);

    // 停止后不再开始新会话
    let late = engine.spawn_session(SessionRequest::new("https://c.example/")).unwrap();
    assert!(matches!(late.join().await, Err(FlouError::Cancelled)));
    assert_eq!(engine.active_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_panicking_session_is_released() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let engine = engine_with_executor(config(60), &[provider], Arc::new(PanickingExecutor));

    let handle = engine.spawn_session(SessionRequest::new("https://example.com/")).unwrap();
    assert!(matches!(handle.join().await, Err(FlouError::TaskAborted(_))));
    assert_eq!(engine.active_sessions(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reject_admission_when_full() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let mut cfg = config(5);
    cfg.session.max_concurrent_sessions = 1;
    cfg.session.admission = AdmissionPolicy::Reject;
    let engine = engine_with(cfg, &[provider]);

    let first = engine.spawn_session(SessionRequest::new("https://example.com/")).unwrap();
    let second = engine.spawn_session(SessionRequest::new("https://example.com/"));
    assert!(matches!(second, Err(FlouError::Admission(_))));

    first.join().await.unwrap();
    let third = engine.spawn_session(SessionRequest::new("https://example.com/")).unwrap();
    assert_eq!(third.join().await.unwrap().phase, SessionPhase::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_queue_admission_runs_sessions_in_turn() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let mut cfg = config(4);
    cfg.session.max_concurrent_sessions = 1;
    let engine = engine_with(cfg, &[provider]);

    let start = tokio::time::Instant::now();
    let first = engine.spawn_session(SessionRequest::new("https://example.com/")).unwrap();
    let second = engine.spawn_session(SessionRequest::new("https://example.com/")).unwrap();
    let r1 = first.join().await.unwrap();
    let r2 = second.join().await.unwrap();

    assert_eq!(r1.phase, SessionPhase::Completed);
    assert_eq!(r2.phase, SessionPhase::Completed);
    // 第二个会话等第一个结束才开始
    assert!(start.elapsed() >= Duration::from_secs(8));
}

#[tokio::test(start_paused = true)]
async fn test_global_memory_shared_across_sessions() {
    let provider = Arc::new(ScriptedProvider::new("primary").repeat_ok(custom_batch()));
    let mut cfg = config(4);
    cfg.memory.mode = MemoryMode::Global;
    let engine = engine_with(cfg, &[provider.clone()]);

    let a = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap();
    let b = engine
        .spawn_session(SessionRequest::new("https://example.com/").with_profile(profile()))
        .unwrap();
    let total = a.join().await.unwrap().interactions + b.join().await.unwrap().interactions;

    let memory = engine.global_memory().unwrap();
    assert_eq!(memory.len(), total);
    let analysis = memory.analyze();
    assert_eq!(analysis.insights.get("note"), Some(&json!("integration")));
    // 后续请求带上了共享记忆
    assert!(!provider.last_request().unwrap().recent_patterns.is_empty());
}

#[test]
fn test_invalid_config_refuses_to_build() {
    let mut cfg = AppConfig::default();
    cfg.session.sophistication = Some(9);
    assert!(matches!(
        EngineBuilder::new(cfg).build(),
        Err(FlouError::Config(_))
    ));
}
