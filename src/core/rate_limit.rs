//! 全局令牌桶限流：跨会话节流 propose/realize
//!
//! Delay：令牌不足时等待补充，最多等到调用方给出的期限（通常是会话剩余预算），仍不足则返回 RateLimited；
//! Reject：立即返回 FlouError::RateLimited（本轮记为失败，不会静默丢弃）。

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::error::FlouError;
use crate::config::{RateLimitPolicy, RateLimitSection};

/// 补充速率下限（令牌/秒），配置校验与构造时都按此截断
pub const MIN_REFILL_PER_SEC: f64 = 1e-3;

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: f64,
    refill_per_sec: f64,
    policy: RateLimitPolicy,
    bucket: Mutex<Bucket>,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64, policy: RateLimitPolicy) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_sec: if refill_per_sec.is_finite() {
                refill_per_sec.max(MIN_REFILL_PER_SEC)
            } else {
                MIN_REFILL_PER_SEC
            },
            policy,
            bucket: Mutex::new(Bucket {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// enabled = false 时返回 None
    pub fn from_config(section: &RateLimitSection) -> Option<Self> {
        section
            .enabled
            .then(|| Self::new(section.capacity, section.refill_per_sec, section.policy))
    }

    /// 尝试取一个令牌；不足时返回还需等待的时间
    fn try_take(&self) -> Result<(), Duration> {
        let mut b = self.bucket.lock();
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(b.last_refill).as_secs_f64();
        b.tokens = (b.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        b.last_refill = now;
        if b.tokens >= 1.0 {
            b.tokens -= 1.0;
            Ok(())
        } else {
            let secs = (1.0 - b.tokens) / self.refill_per_sec;
            Err(Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX))
        }
    }

    /// 取一个令牌；Delay 策略下最多等待 `max_wait`
    pub async fn acquire(&self, max_wait: Duration) -> Result<(), FlouError> {
        let deadline = Instant::now().checked_add(max_wait);
        loop {
            let wait = match self.try_take() {
                Ok(()) => return Ok(()),
                Err(_) if self.policy == RateLimitPolicy::Reject => {
                    return Err(FlouError::RateLimited)
                }
                Err(wait) => wait,
            };
            let left = match deadline {
                Some(d) => d.saturating_duration_since(Instant::now()),
                None => wait,
            };
            if left.is_zero() {
                return Err(FlouError::RateLimited);
            }
            if wait > left {
                tokio::time::sleep(left).await;
                return Err(FlouError::RateLimited);
            }
            tokio::time::sleep(wait).await;
        }
    }
}
