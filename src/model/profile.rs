//! 用户画像：年龄段、兴趣集合、行为风格、熟练度（1–5）
//!
//! 内置四个预设（casual_browser / shopper / researcher / mobile_user），会话未提供画像时按意图提示解析。

use std::collections::BTreeSet;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// 行为风格：影响交互时长
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorStyle {
    Fast,
    Normal,
    Slow,
}

impl BehaviorStyle {
    /// 时长倍率：fast 0.7 / normal 1.0 / slow 1.3
    pub fn speed_multiplier(&self) -> f64 {
        match self {
            BehaviorStyle::Fast => 0.7,
            BehaviorStyle::Normal => 1.0,
            BehaviorStyle::Slow => 1.3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BehaviorStyle::Fast => "fast",
            BehaviorStyle::Normal => "normal",
            BehaviorStyle::Slow => "slow",
        }
    }
}

pub const MIN_SOPHISTICATION: u8 = 1;
pub const MAX_SOPHISTICATION: u8 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    /// 预设名或调用方自定义标识
    pub label: String,
    pub age_bracket: String,
    pub interests: BTreeSet<String>,
    pub style: BehaviorStyle,
    sophistication: u8,
}

impl UserProfile {
    pub fn new(
        label: impl Into<String>,
        age_bracket: impl Into<String>,
        style: BehaviorStyle,
        sophistication: u8,
    ) -> Self {
        Self {
            label: label.into(),
            age_bracket: age_bracket.into(),
            interests: BTreeSet::new(),
            style,
            sophistication: sophistication.clamp(MIN_SOPHISTICATION, MAX_SOPHISTICATION),
        }
    }

    pub fn with_interests<I, S>(mut self, interests: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interests = interests.into_iter().map(Into::into).collect();
        self
    }

    /// 覆盖熟练度，超出 1–5 时截断
    pub fn with_sophistication(mut self, level: u8) -> Self {
        self.sophistication = level.clamp(MIN_SOPHISTICATION, MAX_SOPHISTICATION);
        self
    }

    pub fn sophistication(&self) -> u8 {
        self.sophistication
    }

    pub fn casual_browser() -> Self {
        Self::new("casual_browser", "25-34", BehaviorStyle::Normal, 2)
            .with_interests(["news", "reading", "entertainment"])
    }

    pub fn shopper() -> Self {
        Self::new("shopper", "25-34", BehaviorStyle::Normal, 3)
            .with_interests(["shopping", "deals", "reviews"])
    }

    pub fn researcher() -> Self {
        Self::new("researcher", "35-44", BehaviorStyle::Slow, 4)
            .with_interests(["academic", "reading", "search"])
    }

    pub fn mobile_user() -> Self {
        Self::new("mobile_user", "18-24", BehaviorStyle::Fast, 2)
            .with_interests(["social", "entertainment"])
    }

    pub fn presets() -> Vec<UserProfile> {
        vec![
            Self::casual_browser(),
            Self::shopper(),
            Self::researcher(),
            Self::mobile_user(),
        ]
    }
}

/// 根据意图提示选择预设画像；无提示时随机挑一个，未知提示回落到 casual_browser
pub fn resolve_profile<R: Rng + ?Sized>(hint: Option<&str>, rng: &mut R) -> UserProfile {
    let Some(hint) = hint else {
        let mut presets = UserProfile::presets();
        let idx = rng.gen_range(0..presets.len());
        return presets.swap_remove(idx);
    };
    match hint.trim().to_lowercase().as_str() {
        "shopping" | "ecommerce" | "e-commerce" | "shopper" => UserProfile::shopper(),
        "research" | "academic" | "researcher" => UserProfile::researcher(),
        "mobile" | "mobile_user" => UserProfile::mobile_user(),
        _ => UserProfile::casual_browser(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_sophistication_clamped() {
        let p = UserProfile::new("x", "25-34", BehaviorStyle::Fast, 9);
        assert_eq!(p.sophistication(), 5);
        let p = p.with_sophistication(0);
        assert_eq!(p.sophistication(), 1);
    }

    #[test]
    fn test_resolve_profile_hints() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(resolve_profile(Some("shopping"), &mut rng).label, "shopper");
        assert_eq!(resolve_profile(Some("Research"), &mut rng).label, "researcher");
        assert_eq!(resolve_profile(Some("mobile"), &mut rng).label, "mobile_user");
        assert_eq!(resolve_profile(Some("organic"), &mut rng).label, "casual_browser");
    }

    #[test]
    fn test_resolve_profile_random_is_preset() {
        let mut rng = StdRng::seed_from_u64(42);
        let labels: Vec<String> = UserProfile::presets().into_iter().map(|p| p.label).collect();
        for _ in 0..10 {
            let p = resolve_profile(None, &mut rng);
            assert!(labels.contains(&p.label));
        }
    }
}
