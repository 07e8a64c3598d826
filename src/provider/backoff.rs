//! 退避策略：delay = base * 2^attempt，封顶 max_delay，叠加 ±jitter

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// 单个 Provider 的最大重试次数（总尝试次数 = max_retries + 1）
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// 抖动比例，0.1 表示 ±10%；0 关闭抖动
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_ratio: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 第 `attempt` 次失败（0 起）之后、下次重试之前的无抖动延迟
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt);
        let ratio = self.jitter_ratio.clamp(0.0, 1.0);
        if ratio == 0.0 {
            return nominal;
        }
        let factor = rng.gen_range((1.0 - ratio)..=(1.0 + ratio));
        nominal.mul_f64(factor)
    }

    /// 使用线程 RNG；不要跨 await 持有 ThreadRng，因此这里取完即丢
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }
}
