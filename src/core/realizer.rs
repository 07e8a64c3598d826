//! 交互实现：把选中的 BehaviorPattern 变成带坐标、时长、强度的 Interaction
//!
//! 坐标：`parameters.bounds` 给出元素矩形时在矩形内取点；有目标元素但无矩形时落在内容区；
//! 否则落在缺省视口 1280×800 内（留 50px 边距）。
//! 时长 = 基准 × 风格倍率 × (1 ± intensity_variation)，截断到 [0.5, 上限]。
//! 强度 = base × 置信度修正 × 熟练度修正 × [0.9, 1.1] 随机，截断到 [0.1, 1.0]。

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use serde_json::Value;

use crate::config::SessionSection;
use crate::model::{
    BehaviorPattern, Interaction, SessionContext, DEFAULT_MAX_DURATION_SECS, MAX_INTENSITY,
    MIN_DURATION_SECS, MIN_INTENSITY,
};

pub const VIEWPORT_WIDTH: u32 = 1280;
pub const VIEWPORT_HEIGHT: u32 = 800;
const VIEWPORT_MARGIN: u32 = 50;

/// 有目标元素但没有矩形时的内容区
const CONTENT_X: (u32, u32) = (100, 800);
const CONTENT_Y: (u32, u32) = (100, 600);

#[derive(Debug, Clone)]
pub struct Realizer {
    base_intensity: f64,
    intensity_variation: f64,
    max_duration_secs: f64,
}

impl Default for Realizer {
    fn default() -> Self {
        Self {
            base_intensity: 0.7,
            intensity_variation: 0.2,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

impl Realizer {
    pub fn from_config(section: &SessionSection) -> Self {
        Self {
            base_intensity: section.base_intensity,
            intensity_variation: section.intensity_variation.clamp(0.0, 1.0),
            max_duration_secs: section.max_interaction_secs.max(MIN_DURATION_SECS),
        }
    }

    pub fn realize<R: Rng + ?Sized>(
        &self,
        pattern: Arc<BehaviorPattern>,
        ctx: &SessionContext,
        rng: &mut R,
    ) -> Interaction {
        let coordinates = coordinates(&pattern, rng);
        let duration_secs = self.duration(&pattern, ctx, rng);
        let intensity = self.intensity(&pattern, ctx, rng);
        Interaction {
            pattern,
            coordinates,
            duration_secs,
            intensity,
            context_snapshot: ctx.clone(),
            session_id: ctx.session_id.clone(),
            created_at: Utc::now(),
        }
    }

    pub fn duration<R: Rng + ?Sized>(
        &self,
        pattern: &BehaviorPattern,
        ctx: &SessionContext,
        rng: &mut R,
    ) -> f64 {
        let mut d = pattern.baseline_duration() * ctx.user_profile.style.speed_multiplier();
        if self.intensity_variation > 0.0 {
            d *= rng.gen_range(1.0 - self.intensity_variation..=1.0 + self.intensity_variation);
        }
        d.clamp(MIN_DURATION_SECS, self.max_duration_secs)
    }

    pub fn intensity<R: Rng + ?Sized>(
        &self,
        pattern: &BehaviorPattern,
        ctx: &SessionContext,
        rng: &mut R,
    ) -> f64 {
        let mut i = self.base_intensity;
        if pattern.confidence() > 0.8 {
            i *= 1.1;
        } else if pattern.confidence() < 0.6 {
            i *= 0.9;
        }
        if ctx.user_profile.sophistication() > 3 {
            i *= 1.05;
        }
        i *= rng.gen_range(0.9..=1.1);
        i.clamp(MIN_INTENSITY, MAX_INTENSITY)
    }
}

fn coordinates<R: Rng + ?Sized>(pattern: &BehaviorPattern, rng: &mut R) -> (u32, u32) {
    if let Some((x, y, w, h)) = bounds(pattern) {
        return (
            rng.gen_range(x..=x.saturating_add(w)),
            rng.gen_range(y..=y.saturating_add(h)),
        );
    }
    if pattern.target_element().is_some() {
        return (
            rng.gen_range(CONTENT_X.0..=CONTENT_X.1),
            rng.gen_range(CONTENT_Y.0..=CONTENT_Y.1),
        );
    }
    (
        rng.gen_range(VIEWPORT_MARGIN..=VIEWPORT_WIDTH - VIEWPORT_MARGIN),
        rng.gen_range(VIEWPORT_MARGIN..=VIEWPORT_HEIGHT - VIEWPORT_MARGIN),
    )
}

/// `parameters.bounds = {x, y, width, height}`，字段缺失或为负时忽略整个矩形
fn bounds(pattern: &BehaviorPattern) -> Option<(u32, u32, u32, u32)> {
    let b = pattern.parameters().get("bounds")?.as_object()?;
    let field = |k: &str| {
        b.get(k)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v.min(f64::from(u32::MAX / 2)) as u32)
    };
    Some((field("x")?, field("y")?, field("width")?, field("height")?))
}
