//! Flou - Rust 合成交互引擎
//!
//! 入口：加载配置、初始化日志、构建引擎，运行配置中的会话（未配置时跑一个演示会话），
//! Ctrl+C / SIGTERM 时排空会话，最后以 JSON 输出会话报告与全局指标。
//!
//! 用法：`flou [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use flou::core::{
    MemoryReportCleanup, MetricsReportCleanup, SessionRequest, ShutdownCoordinator,
    ShutdownManager,
};
use flou::{load_config, observability, EngineBuilder};
use futures_util::future::join_all;

const DEMO_TARGET: &str = "https://example.com/";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let cfg = load_config(config_path).context("Failed to load config")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();

    let engine = EngineBuilder::new(cfg)
        .with_shutdown_token(shutdown.token())
        .build()
        .context("Failed to build engine")?;

    let mut requests: Vec<SessionRequest> = engine
        .config()
        .app
        .targets
        .iter()
        .map(|t| {
            let mut req = SessionRequest::new(&t.url);
            if let Some(hint) = &t.profile {
                req = req.with_hint(hint);
            }
            if let Some(secs) = t.duration_secs {
                req = req.with_budget(Duration::from_secs(secs));
            }
            req
        })
        .collect();
    if requests.is_empty() {
        tracing::info!(target_url = DEMO_TARGET, "No targets configured, running a demo session");
        requests.push(SessionRequest::new(DEMO_TARGET).with_hint("organic"));
    }

    let mut handles = Vec::with_capacity(requests.len());
    for request in requests {
        let target = request.target.clone();
        match engine.spawn_session(request) {
            Ok(handle) => handles.push(handle),
            Err(e) => tracing::warn!(target_url = %target, error = %e, "Session not started"),
        }
    }

    let mut reports = Vec::with_capacity(handles.len());
    for result in join_all(handles.into_iter().map(|h| h.join())).await {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => tracing::warn!(error = %e, "Session did not produce a report"),
        }
    }

    let mut coordinator = ShutdownCoordinator::new(Arc::clone(&shutdown));
    coordinator.register(MetricsReportCleanup::new(engine.metrics()));
    if let Some(memory) = engine.global_memory() {
        coordinator.register(MemoryReportCleanup::new(memory));
    }
    coordinator.run_cleanup().await;

    let output = serde_json::json!({
        "sessions": reports,
        "global": engine.global_summary(),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&output).context("Failed to serialize report")?
    );
    Ok(())
}
