//! 自适应记忆：最近实现的行为模式，容量有界，严格 FIFO 淘汰
//!
//! 写入经单把写锁串行化；读取取共享锁并返回拥有所有权的快照，读者之间互不阻塞。
//! 全局模式下多个会话共享同一实例（Arc），否则每个会话各持一份。

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::model::{BehaviorPattern, PatternKind};

/// insights 最多保留的键数，超出时淘汰最早写入的键
pub const MAX_INSIGHT_KEYS: usize = 64;

/// 记忆条目：没有真实反馈，插入时的得分即置信度
#[derive(Debug, Clone, Serialize)]
pub struct MemoryEntry {
    pub pattern: Arc<BehaviorPattern>,
    pub score_at_insertion: f64,
    pub inserted_at: DateTime<Utc>,
}

/// analyze() 的结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryAnalysis {
    pub total: usize,
    /// 当前条目 score_at_insertion 的平均值；空时为 0
    pub average_success_rate: f64,
    pub kind_histogram: BTreeMap<PatternKind, usize>,
    pub insights: Map<String, Value>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: VecDeque<MemoryEntry>,
    insights: Map<String, Value>,
    /// insights 键的写入顺序
    insight_order: VecDeque<String>,
}

#[derive(Debug)]
pub struct AdaptiveMemory {
    capacity: usize,
    inner: RwLock<Inner>,
}

impl AdaptiveMemory {
    /// capacity 为 0 时按 1 处理（配置校验已拒绝 0）
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: RwLock::new(Inner {
                entries: VecDeque::with_capacity(capacity.min(1024)),
                insights: Map::new(),
                insight_order: VecDeque::new(),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 追加一批模式并合并 insights；模式超出容量时从最旧处淘汰，insights 键数不超过 MAX_INSIGHT_KEYS
    pub fn add<I>(&self, patterns: I, insights: Option<&Map<String, Value>>)
    where
        I: IntoIterator<Item = Arc<BehaviorPattern>>,
    {
        let now = Utc::now();
        let mut inner = self.inner.write();
        for pattern in patterns {
            if inner.entries.len() == self.capacity {
                inner.entries.pop_front();
            }
            let score = pattern.confidence();
            inner.entries.push_back(MemoryEntry {
                pattern,
                score_at_insertion: score,
                inserted_at: now,
            });
        }
        if let Some(map) = insights {
            for (k, v) in map {
                if inner.insights.insert(k.clone(), v.clone()).is_none() {
                    inner.insight_order.push_back(k.clone());
                }
            }
            while inner.insight_order.len() > MAX_INSIGHT_KEYS {
                if let Some(oldest) = inner.insight_order.pop_front() {
                    inner.insights.remove(&oldest);
                }
            }
        }
    }

    /// 最近 n 条，按插入顺序（旧 → 新）
    pub fn recent(&self, n: usize) -> Vec<Arc<BehaviorPattern>> {
        let inner = self.inner.read();
        let skip = inner.entries.len().saturating_sub(n);
        inner
            .entries
            .iter()
            .skip(skip)
            .map(|e| Arc::clone(&e.pattern))
            .collect()
    }

    pub fn analyze(&self) -> MemoryAnalysis {
        let inner = self.inner.read();
        let total = inner.entries.len();
        let mut kind_histogram = BTreeMap::new();
        let mut score_sum = 0.0;
        for e in &inner.entries {
            *kind_histogram.entry(e.pattern.kind()).or_insert(0) += 1;
            score_sum += e.score_at_insertion;
        }
        MemoryAnalysis {
            total,
            average_success_rate: if total == 0 { 0.0 } else { score_sum / total as f64 },
            kind_histogram,
            insights: inner.insights.clone(),
        }
    }
}
