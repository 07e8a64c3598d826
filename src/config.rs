//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `FLOU__*` 覆盖（双下划线表示嵌套，如 `FLOU__SESSION__DURATION_SECS=120`）。
//! 构造引擎时调用 [`AppConfig::validate`]，不合法的配置直接拒绝启动；之后配置只读。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::error::FlouError;
use crate::core::rate_limit::MIN_REFILL_PER_SEC;
use crate::model::{PatternKind, MIN_DURATION_SECS};
use crate::provider::RetryPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub provider: ProviderSection,
    pub memory: MemorySection,
    pub pacing: PacingSection,
    pub selection: SelectionSection,
    pub session: SessionSection,
    pub metrics: MetricsSection,
    pub rate_limit: RateLimitSection,
}

/// [app] 段：应用名、随机种子、二进制运行的演示会话
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 设置后所有会话的随机序列可复现
    pub seed: Option<u64>,
    pub targets: Vec<TargetSection>,
}

/// [[app.targets]]：一个演示会话
#[derive(Debug, Clone, Deserialize)]
pub struct TargetSection {
    pub url: String,
    /// 画像提示：shopping / research / mobile / organic ...
    pub profile: Option<String>,
    pub duration_secs: Option<u64>,
}

/// [provider] 段：Provider 列表（按优先级）、重试退避、超时、置信度阈值
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub entries: Vec<ProviderEntry>,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// 0 关闭抖动
    pub jitter_ratio: f64,
    /// 单次 Provider 调用的硬超时
    pub request_timeout_ms: u64,
    pub confidence_threshold: f64,
    /// 每轮请求的候选数量（1-5）
    pub batch_size: usize,
    /// 开启后请求里附带最近记忆
    pub adaptive_learning: bool,
    pub prime_count: usize,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            max_retries: 3,
            backoff_base_ms: 1000,
            backoff_max_ms: 30_000,
            jitter_ratio: 0.1,
            request_timeout_ms: 30_000,
            confidence_threshold: 0.7,
            batch_size: 3,
            adaptive_learning: true,
            prime_count: 50,
        }
    }
}

impl ProviderSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.backoff_base_ms),
            max_delay: Duration::from_millis(self.backoff_max_ms),
            jitter_ratio: self.jitter_ratio,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// [[provider.entries]]：kind = openai / http / scripted
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub kind: String,
    pub model: Option<String>,
    /// openai：可选的兼容端点
    pub base_url: Option<String>,
    /// http：服务根地址
    pub endpoint: Option<String>,
    /// 存放 API Key 的环境变量名
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    0.7
}

/// 记忆模式：每会话独立，或所有会话共享一份
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryMode {
    #[default]
    PerSession,
    Global,
}

/// [memory] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub capacity: usize,
    pub mode: MemoryMode,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            capacity: 1000,
            mode: MemoryMode::PerSession,
        }
    }
}

/// [pacing] 段：两次交互之间的随机间隔（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingSection {
    pub min_delay_secs: f64,
    pub max_delay_secs: f64,
}

impl Default for PacingSection {
    fn default() -> Self {
        Self {
            min_delay_secs: 0.5,
            max_delay_secs: 3.0,
        }
    }
}

/// [selection] 段：允许的行为类型与类型分组
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SelectionSection {
    pub enabled_kinds: Vec<PatternKind>,
    /// 会话早期（交互数 < 3）只选这些类型
    pub casual_kinds: Vec<PatternKind>,
    /// 会话后期（交互数 > 10）只选这些类型
    pub sophisticated_kinds: Vec<PatternKind>,
    /// 节奏放慢 1.5 倍的内容型类型
    pub content_heavy_kinds: Vec<PatternKind>,
}

impl Default for SelectionSection {
    fn default() -> Self {
        use PatternKind::*;
        Self {
            enabled_kinds: PatternKind::ALL.to_vec(),
            casual_kinds: vec![Browsing, Scrolling, Navigation],
            sophisticated_kinds: vec![Clicking, FormFilling, Search, Social, ECommerce, Custom],
            content_heavy_kinds: vec![Search, FormFilling, ECommerce],
        }
    }
}

/// 会话准入策略：满额时排队等待，或直接拒绝
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    #[default]
    Queue,
    Reject,
}

/// [session] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub duration_secs: u64,
    /// 设置后覆盖画像预设的熟练度（1-5）
    pub sophistication: Option<u8>,
    pub base_intensity: f64,
    /// 时长抖动比例，0.2 表示 ±20%
    pub intensity_variation: f64,
    pub max_interaction_secs: f64,
    pub consecutive_failure_threshold: u32,
    /// tick 失败后的等待时间
    pub failure_delay_ms: u64,
    pub max_concurrent_sessions: usize,
    pub admission: AdmissionPolicy,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            duration_secs: 300,
            sophistication: None,
            base_intensity: 0.7,
            intensity_variation: 0.2,
            max_interaction_secs: 10.0,
            consecutive_failure_threshold: 5,
            failure_delay_ms: 500,
            max_concurrent_sessions: 15,
            admission: AdmissionPolicy::Queue,
        }
    }
}

impl SessionSection {
    pub fn budget(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// [metrics] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub retention_secs: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 3600,
        }
    }
}

/// 超限时的处理：等待令牌或立即拒绝（本轮记为失败）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPolicy {
    #[default]
    Delay,
    Reject,
}

/// [rate_limit] 段：跨会话的全局令牌桶
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub enabled: bool,
    pub capacity: u32,
    pub refill_per_sec: f64,
    pub policy: RateLimitPolicy,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            enabled: false,
            capacity: 10,
            refill_per_sec: 5.0,
            policy: RateLimitPolicy::Delay,
        }
    }
}

fn invalid(msg: impl Into<String>) -> FlouError {
    FlouError::Config(msg.into())
}

impl AppConfig {
    /// 校验取值范围，任何不合法项都返回 FlouError::Config
    pub fn validate(&self) -> Result<(), FlouError> {
        let p = &self.provider;
        if !(0.0..=1.0).contains(&p.confidence_threshold) {
            return Err(invalid(format!(
                "provider.confidence_threshold {} outside [0, 1]",
                p.confidence_threshold
            )));
        }
        if !(1..=5).contains(&p.batch_size) {
            return Err(invalid(format!("provider.batch_size {} outside 1-5", p.batch_size)));
        }
        if p.backoff_base_ms > p.backoff_max_ms {
            return Err(invalid("provider.backoff_base_ms exceeds backoff_max_ms"));
        }
        if !(0.0..=1.0).contains(&p.jitter_ratio) {
            return Err(invalid("provider.jitter_ratio outside [0, 1]"));
        }
        if p.request_timeout_ms == 0 {
            return Err(invalid("provider.request_timeout_ms must be positive"));
        }
        for entry in &p.entries {
            match entry.kind.as_str() {
                "openai" | "scripted" => {}
                "http" if entry.endpoint.is_some() => {}
                "http" => {
                    return Err(invalid(format!(
                        "provider `{}`: http provider needs an endpoint",
                        entry.name
                    )))
                }
                other => {
                    return Err(invalid(format!(
                        "provider `{}`: unknown kind `{other}`",
                        entry.name
                    )))
                }
            }
        }

        if self.memory.capacity == 0 {
            return Err(invalid("memory.capacity must be positive"));
        }

        let pacing = &self.pacing;
        if !(pacing.min_delay_secs.is_finite() && pacing.min_delay_secs >= 0.0) {
            return Err(invalid("pacing.min_delay_secs must be a non-negative number"));
        }
        if !(pacing.max_delay_secs.is_finite() && pacing.min_delay_secs <= pacing.max_delay_secs) {
            return Err(invalid("pacing.min_delay_secs exceeds max_delay_secs"));
        }

        if self.selection.enabled_kinds.is_empty() {
            return Err(invalid("selection.enabled_kinds must not be empty"));
        }

        let s = &self.session;
        if s.duration_secs == 0 {
            return Err(invalid("session.duration_secs must be positive"));
        }
        if let Some(level) = s.sophistication {
            if !(1..=5).contains(&level) {
                return Err(invalid(format!("session.sophistication {level} outside 1-5")));
            }
        }
        if !(0.0..=1.0).contains(&s.base_intensity) {
            return Err(invalid(format!(
                "session.base_intensity {} outside [0, 1]",
                s.base_intensity
            )));
        }
        if !(0.0..1.0).contains(&s.intensity_variation) {
            return Err(invalid("session.intensity_variation outside [0, 1)"));
        }
        if !(s.max_interaction_secs.is_finite() && s.max_interaction_secs >= MIN_DURATION_SECS) {
            return Err(invalid(format!(
                "session.max_interaction_secs must be at least {MIN_DURATION_SECS}"
            )));
        }
        if s.consecutive_failure_threshold == 0 {
            return Err(invalid("session.consecutive_failure_threshold must be positive"));
        }
        if s.max_concurrent_sessions == 0 {
            return Err(invalid("session.max_concurrent_sessions must be positive"));
        }

        let r = &self.rate_limit;
        if r.enabled && r.capacity == 0 {
            return Err(invalid("rate_limit.capacity must be positive"));
        }
        if r.enabled && !(r.refill_per_sec.is_finite() && r.refill_per_sec >= MIN_REFILL_PER_SEC) {
            return Err(invalid(format!(
                "rate_limit.refill_per_sec must be a finite rate of at least {MIN_REFILL_PER_SEC}"
            )));
        }
        Ok(())
    }
}

/// 从 config 目录加载配置，环境变量 FLOU__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 FLOU__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("FLOU")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
