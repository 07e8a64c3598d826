//! 候选选择器（纯函数，无 I/O）
//!
//! 得分 = 0.4 × 置信度 + 0.3 × 画像契合度 + 0.2 × 上下文相关度 + 0.1 × 新颖度。
//! 打分前按会话进度过滤类型：交互数 < 3 只留 casual，> 10 只留 sophisticated，过滤后为空则退回全集。
//! 同分取先到者。

pub mod categories;

pub use categories::KindCategories;

use serde_json::Value;

use crate::model::{BehaviorPattern, SessionContext, UserProfile};

pub const CONFIDENCE_WEIGHT: f64 = 0.4;
pub const PROFILE_WEIGHT: f64 = 0.3;
pub const CONTEXT_WEIGHT: f64 = 0.2;
pub const NOVELTY_WEIGHT: f64 = 0.1;

/// 早期阶段上限（不含）与后期阶段下限（不含）
pub const EARLY_SESSION_INTERACTIONS: usize = 3;
pub const LATE_SESSION_INTERACTIONS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct CandidateSelector {
    categories: KindCategories,
}

impl CandidateSelector {
    pub fn new(categories: KindCategories) -> Self {
        Self { categories }
    }

    /// 选出得分最高的候选；仅在输入为空时返回 None
    pub fn select<'a>(
        &self,
        candidates: &'a [BehaviorPattern],
        ctx: &SessionContext,
        profile: &UserProfile,
    ) -> Option<&'a BehaviorPattern> {
        let eligible = self.progress_filter(candidates, ctx.interaction_count());
        let mut best: Option<(&BehaviorPattern, f64)> = None;
        for candidate in eligible {
            let score = self.score(candidate, ctx, profile);
            // 严格大于：同分保留先到者
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((candidate, score));
            }
        }
        best.map(|(p, _)| p)
    }

    pub fn score(&self, pattern: &BehaviorPattern, ctx: &SessionContext, profile: &UserProfile) -> f64 {
        let novelty = if ctx.recently_used(pattern.kind()) { 0.0 } else { 1.0 };
        CONFIDENCE_WEIGHT * pattern.confidence()
            + PROFILE_WEIGHT * profile_compatibility(pattern, profile)
            + CONTEXT_WEIGHT * pattern.hint("context_relevance").unwrap_or(0.0)
            + NOVELTY_WEIGHT * novelty
    }

    fn progress_filter<'a>(
        &self,
        candidates: &'a [BehaviorPattern],
        interaction_count: usize,
    ) -> Vec<&'a BehaviorPattern> {
        let keep = |p: &BehaviorPattern| {
            if interaction_count < EARLY_SESSION_INTERACTIONS {
                self.categories.is_casual(p.kind())
            } else if interaction_count > LATE_SESSION_INTERACTIONS {
                self.categories.is_sophisticated(p.kind())
            } else {
                true
            }
        };
        let filtered: Vec<&BehaviorPattern> = candidates.iter().filter(|p| keep(*p)).collect();
        if filtered.is_empty() {
            candidates.iter().collect()
        } else {
            filtered
        }
    }
}

/// 画像契合度：`profile_compatibility` 数值提示；或 `compatible_profiles` 列表包含画像标签 / 风格时记 1
fn profile_compatibility(pattern: &BehaviorPattern, profile: &UserProfile) -> f64 {
    let listed = pattern
        .parameters()
        .get("compatible_profiles")
        .and_then(Value::as_array)
        .is_some_and(|names| {
            names.iter().filter_map(Value::as_str).any(|n| {
                n.eq_ignore_ascii_case(&profile.label) || n.eq_ignore_ascii_case(profile.style.as_str())
            })
        });
    if listed {
        1.0
    } else {
        pattern.hint("profile_compatibility").unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PatternKind, SessionId};
    use serde_json::json;
    use std::time::Duration;

    fn ctx_with(count: usize, recent: &[PatternKind]) -> SessionContext {
        let mut ctx = SessionContext::new(
            SessionId::from("s"),
            "https://example.com",
            Duration::from_secs(60),
            UserProfile::casual_browser(),
        );
        // 先填计数，再让 recent 窗口只留下指定类型
        for _ in 0..count.saturating_sub(recent.len()) {
            ctx.record_interaction(PatternKind::Custom);
        }
        for k in recent {
            ctx.record_interaction(*k);
        }
        ctx
    }

    fn p(kind: PatternKind, action: &str, confidence: f64) -> BehaviorPattern {
        BehaviorPattern::new(kind, action, confidence, "test").unwrap()
    }

    #[test]
    fn test_empty_input_returns_none() {
        let sel = CandidateSelector::default();
        let ctx = ctx_with(5, &[]);
        assert!(sel.select(&[], &ctx, &UserProfile::shopper()).is_none());
    }

    #[test]
    fn test_weighted_score() {
        let sel = CandidateSelector::default();
        let ctx = ctx_with(5, &[PatternKind::Search]);
        let profile = UserProfile::shopper();
        let pat = p(PatternKind::Clicking, "c", 0.5)
            .with_parameter("profile_compatibility", json!(0.5))
            .with_parameter("context_relevance", json!(1.0));
        let score = sel.score(&pat, &ctx, &profile);
        assert!((score - (0.2 + 0.15 + 0.2 + 0.1)).abs() < 1e-9);

        let seen = p(PatternKind::Search, "s", 0.5);
        assert!((sel.score(&seen, &ctx, &profile) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_ties_keep_arrival_order() {
        let sel = CandidateSelector::default();
        let ctx = ctx_with(5, &[]);
        let candidates = vec![
            p(PatternKind::Clicking, "first", 0.8),
            p(PatternKind::Search, "second", 0.8),
        ];
        let chosen = sel.select(&candidates, &ctx, &UserProfile::shopper()).unwrap();
        assert_eq!(chosen.action(), "first");
    }

    #[test]
    fn test_early_session_prefers_casual() {
        let sel = CandidateSelector::default();
        let ctx = ctx_with(0, &[]);
        let candidates = vec![
            p(PatternKind::ECommerce, "buy", 0.99),
            p(PatternKind::Scrolling, "scroll", 0.7),
        ];
        let chosen = sel.select(&candidates, &ctx, &UserProfile::shopper()).unwrap();
        assert_eq!(chosen.kind(), PatternKind::Scrolling);
    }

    #[test]
    fn test_late_session_prefers_sophisticated() {
        let sel = CandidateSelector::default();
        let ctx = ctx_with(11, &[]);
        let candidates = vec![
            p(PatternKind::Browsing, "read", 0.99),
            p(PatternKind::FormFilling, "fill", 0.71),
        ];
        let chosen = sel.select(&candidates, &ctx, &UserProfile::shopper()).unwrap();
        assert_eq!(chosen.kind(), PatternKind::FormFilling);
    }

    #[test]
    fn test_filter_falls_back_to_full_set() {
        let sel = CandidateSelector::default();
        let ctx = ctx_with(1, &[]);
        let candidates = vec![
            p(PatternKind::Search, "q", 0.75),
            p(PatternKind::Social, "like", 0.9),
        ];
        let chosen = sel.select(&candidates, &ctx, &UserProfile::shopper()).unwrap();
        assert_eq!(chosen.kind(), PatternKind::Social);
    }

    #[test]
    fn test_compatible_profiles_list() {
        let sel = CandidateSelector::default();
        let ctx = ctx_with(5, &[]);
        let profile = UserProfile::shopper();
        let pat = p(PatternKind::ECommerce, "cart", 0.7)
            .with_parameter("compatible_profiles", json!([profile.label.clone()]));
        let plain = p(PatternKind::ECommerce, "cart", 0.7);
        assert!(sel.score(&pat, &ctx, &profile) - sel.score(&plain, &ctx, &profile) > 0.29);
    }
}
