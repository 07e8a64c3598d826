//! Flou - Rust 合成交互引擎
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）与校验
//! - **core**: 会话编排、错误与恢复、调度、限流、交互实现、引擎装配、优雅关闭
//! - **memory**: 自适应记忆（有界 FIFO + Provider insights）
//! - **metrics**: 会话级与全局指标聚合
//! - **model**: 行为模式、用户画像、会话上下文、交互
//! - **observability**: tracing 初始化
//! - **provider**: Provider 接口与实现（OpenAI 兼容 / HTTP / Scripted）、重试退避、schema 校验
//! - **selector**: 候选打分与选择

pub mod config;
pub mod core;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod observability;
pub mod provider;
pub mod selector;

pub use crate::core::{Engine, EngineBuilder, FlouError, SessionHandle, SessionReport, SessionRequest};
pub use config::{load_config, AppConfig};
