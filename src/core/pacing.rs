//! 交互间隔：uniform(min, max) × 类型修正 × 强度修正，截断到 [0.1, 5.0] 秒

use std::time::Duration;

use rand::Rng;

use crate::config::PacingSection;
use crate::model::PatternKind;
use crate::selector::KindCategories;

const MIN_PACING_SECS: f64 = 0.1;
const MAX_PACING_SECS: f64 = 5.0;

#[derive(Debug, Clone)]
pub struct Pacing {
    min_delay_secs: f64,
    max_delay_secs: f64,
    categories: KindCategories,
}

impl Pacing {
    pub fn new(section: &PacingSection, categories: KindCategories) -> Self {
        Self {
            min_delay_secs: section.min_delay_secs,
            max_delay_secs: section.max_delay_secs,
            categories,
        }
    }

    /// kind / intensity 为刚完成的那次交互
    pub fn delay<R: Rng + ?Sized>(&self, kind: PatternKind, intensity: f64, rng: &mut R) -> Duration {
        let mut secs = if self.max_delay_secs > self.min_delay_secs {
            rng.gen_range(self.min_delay_secs..self.max_delay_secs)
        } else {
            self.min_delay_secs
        };
        if self.categories.is_content_heavy(kind) {
            secs *= 1.5;
        } else if self.categories.is_casual(kind) {
            secs *= 0.8;
        }
        if intensity > 0.8 {
            secs *= 1.2;
        }
        Duration::from_secs_f64(secs.clamp(MIN_PACING_SECS, MAX_PACING_SECS))
    }
}
