//! 指标聚合器
//!
//! 每会话记录按 session_id 哈希分片，各分片一把 parking_lot 互斥锁；全局计数用原子量。
//! 写入时顺带清理超出保留窗口的会话记录（每个分片按间隔惰性执行）。

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::state::SessionPhase;
use crate::model::{Interaction, PatternKind, SessionId};

const SHARDS: usize = 16;
const MAX_PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// 单会话汇总
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    /// 成功 + 失败
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    /// 已实现并交给执行器的交互数
    pub interactions: u64,
    pub cumulative_latency_ms: u64,
    pub average_latency_ms: f64,
    pub kind_histogram: BTreeMap<PatternKind, u64>,
    pub average_intensity: f64,
    pub average_duration_secs: f64,
    pub average_confidence: f64,
    pub success_rate: f64,
    /// 按错误类别
    pub error_histogram: BTreeMap<String, u64>,
    pub status_histogram: BTreeMap<u16, u64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub phase: Option<SessionPhase>,
}

/// 全局汇总
#[derive(Debug, Clone, Serialize)]
pub struct GlobalSummary {
    pub sessions_total: u64,
    pub sessions_active: u64,
    pub interactions: u64,
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    pub average_latency_ms: f64,
    pub provider_usage: BTreeMap<String, u64>,
}

#[derive(Debug)]
struct SessionRecord {
    successes: u64,
    failures: u64,
    interactions: u64,
    latency_ms: u64,
    intensity_sum: f64,
    duration_sum: f64,
    confidence_sum: f64,
    kinds: BTreeMap<PatternKind, u64>,
    errors: BTreeMap<String, u64>,
    statuses: BTreeMap<u16, u64>,
    started_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    phase: Option<SessionPhase>,
}

impl SessionRecord {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            successes: 0,
            failures: 0,
            interactions: 0,
            latency_ms: 0,
            intensity_sum: 0.0,
            duration_sum: 0.0,
            confidence_sum: 0.0,
            kinds: BTreeMap::new(),
            errors: BTreeMap::new(),
            statuses: BTreeMap::new(),
            started_at: now,
            updated_at: now,
            ended_at: None,
            phase: None,
        }
    }

    fn summary(&self, session_id: &SessionId) -> SessionSummary {
        let total = self.successes + self.failures;
        let n = self.interactions as f64;
        let avg = |sum: f64| if self.interactions == 0 { 0.0 } else { sum / n };
        SessionSummary {
            session_id: session_id.clone(),
            total,
            successes: self.successes,
            failures: self.failures,
            interactions: self.interactions,
            cumulative_latency_ms: self.latency_ms,
            average_latency_ms: avg(self.latency_ms as f64),
            kind_histogram: self.kinds.clone(),
            average_intensity: avg(self.intensity_sum),
            average_duration_secs: avg(self.duration_sum),
            average_confidence: avg(self.confidence_sum),
            success_rate: if total == 0 {
                0.0
            } else {
                self.successes as f64 / total as f64
            },
            error_histogram: self.errors.clone(),
            status_histogram: self.statuses.clone(),
            started_at: self.started_at,
            ended_at: self.ended_at,
            phase: self.phase,
        }
    }
}

#[derive(Debug)]
struct Shard {
    sessions: HashMap<SessionId, SessionRecord>,
    last_prune: DateTime<Utc>,
}

pub struct MetricsAggregator {
    shards: Vec<Mutex<Shard>>,
    retention: Duration,
    sessions_total: AtomicU64,
    sessions_active: AtomicU64,
    interactions: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    latency_ms: AtomicU64,
    provider_usage: Mutex<BTreeMap<String, u64>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(Duration::from_secs(24 * 3600))
    }
}

impl MetricsAggregator {
    pub fn new(retention: Duration) -> Self {
        let now = Utc::now();
        Self {
            shards: (0..SHARDS)
                .map(|_| {
                    Mutex::new(Shard {
                        sessions: HashMap::new(),
                        last_prune: now,
                    })
                })
                .collect(),
            retention,
            sessions_total: AtomicU64::new(0),
            sessions_active: AtomicU64::new(0),
            interactions: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            latency_ms: AtomicU64::new(0),
            provider_usage: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    fn shard(&self, session_id: &SessionId) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        session_id.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) % SHARDS]
    }

    /// 在分片内写入；必要时先清理过期记录
    fn with_record<F>(&self, session_id: &SessionId, f: F)
    where
        F: FnOnce(&mut SessionRecord),
    {
        let now = Utc::now();
        let mut shard = self.shard(session_id).lock();
        let interval = self.retention.min(MAX_PRUNE_INTERVAL);
        if (now - shard.last_prune).to_std().unwrap_or_default() >= interval {
            Self::prune_shard(&mut shard, now, self.retention);
        }
        let record = shard
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionRecord::new(now));
        record.updated_at = now;
        f(record);
    }

    fn prune_shard(shard: &mut Shard, now: DateTime<Utc>, retention: Duration) -> usize {
        let before = shard.sessions.len();
        let retention = chrono::Duration::from_std(retention).unwrap_or_else(|_| chrono::Duration::days(36_500));
        shard
            .sessions
            .retain(|_, r| now.signed_duration_since(r.updated_at) < retention);
        shard.last_prune = now;
        before - shard.sessions.len()
    }

    /// 清理所有分片中早于 `now - retention` 的记录，返回清理数量
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        self.shards
            .iter()
            .map(|s| Self::prune_shard(&mut s.lock(), now, self.retention))
            .sum()
    }

    pub fn begin_session(&self, session_id: &SessionId) {
        self.sessions_total.fetch_add(1, Ordering::Relaxed);
        self.sessions_active.fetch_add(1, Ordering::Relaxed);
        self.with_record(session_id, |r| r.phase = Some(SessionPhase::Running));
    }

    /// Draining 时调用：写入结束时间与最终阶段，返回最终汇总
    pub fn end_session(&self, session_id: &SessionId, phase: SessionPhase) -> Option<SessionSummary> {
        let mut ended = false;
        self.with_record(session_id, |r| {
            if r.ended_at.is_none() {
                r.ended_at = Some(Utc::now());
                ended = true;
            }
            r.phase = Some(phase);
        });
        if ended {
            let _ = self
                .sessions_active
                .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
        }
        self.summary(session_id)
    }

    pub fn record(&self, interaction: &Interaction, success: bool, latency: Duration) {
        self.record_execution(interaction, success, latency, None);
    }

    /// 记录一次执行结果（含执行器返回的状态码）
    pub fn record_execution(
        &self,
        interaction: &Interaction,
        success: bool,
        latency: Duration,
        status: Option<u16>,
    ) {
        let latency_ms = latency.as_millis() as u64;
        let pattern = &interaction.pattern;
        self.with_record(&interaction.session_id, |r| {
            r.interactions += 1;
            if success {
                r.successes += 1;
            } else {
                r.failures += 1;
            }
            r.latency_ms += latency_ms;
            r.intensity_sum += interaction.intensity;
            r.duration_sum += interaction.duration_secs;
            r.confidence_sum += pattern.confidence();
            *r.kinds.entry(pattern.kind()).or_insert(0) += 1;
            if let Some(code) = status {
                *r.statuses.entry(code).or_insert(0) += 1;
            }
        });

        self.interactions.fetch_add(1, Ordering::Relaxed);
        if success {
            self.successes.fetch_add(1, Ordering::Relaxed);
        } else {
            self.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        *self
            .provider_usage
            .lock()
            .entry(pattern.provider().to_string())
            .or_insert(0) += 1;
    }

    /// 记录一次 tick 失败（未产生交互）
    pub fn record_failure(&self, session_id: &SessionId, kind: Option<PatternKind>, category: &str) {
        self.with_record(session_id, |r| {
            r.failures += 1;
            *r.errors.entry(category.to_string()).or_insert(0) += 1;
            if let Some(kind) = kind {
                *r.errors.entry(format!("{category}:{kind}")).or_insert(0) += 1;
            }
        });
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn summary(&self, session_id: &SessionId) -> Option<SessionSummary> {
        self.shard(session_id)
            .lock()
            .sessions
            .get(session_id)
            .map(|r| r.summary(session_id))
    }

    pub fn global_summary(&self) -> GlobalSummary {
        let interactions = self.interactions.load(Ordering::Relaxed);
        let successes = self.successes.load(Ordering::Relaxed);
        let failures = self.failures.load(Ordering::Relaxed);
        let latency = self.latency_ms.load(Ordering::Relaxed);
        let total = successes + failures;
        GlobalSummary {
            sessions_total: self.sessions_total.load(Ordering::Relaxed),
            sessions_active: self.sessions_active.load(Ordering::Relaxed),
            interactions,
            successes,
            failures,
            success_rate: if total == 0 { 0.0 } else { successes as f64 / total as f64 },
            average_latency_ms: if interactions == 0 {
                0.0
            } else {
                latency as f64 / interactions as f64
            },
            provider_usage: self.provider_usage.lock().clone(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.shards.iter().map(|s| s.lock().sessions.len()).sum()
    }
}
