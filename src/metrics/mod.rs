//! 指标层：会话与全局统计，供外部面板 / CLI 轮询

pub mod aggregator;

pub use aggregator::{GlobalSummary, MetricsAggregator, SessionSummary};
