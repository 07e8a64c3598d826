//! 行为生成提示词
//!
//! 由目标 URL、会话时长、页面元素、允许的行为类型、期望数量与最近记忆拼成；
//! 末尾附按类型的关注点和响应 JSON Schema。

use std::fmt::Write;

use crate::model::PatternKind;

use super::schema::response_schema_json;
use super::traits::RecentPattern;

/// 每种行为类型的生成侧重点
fn kind_focus(kind: PatternKind) -> &'static str {
    match kind {
        PatternKind::Browsing => "reading content at a natural pace, pausing on interesting sections",
        PatternKind::Clicking => "clicking links and buttons a real visitor would notice",
        PatternKind::Scrolling => "scrolling with variable speed and occasional scroll-backs",
        PatternKind::FormFilling => "filling inputs with realistic typing rhythm and corrections",
        PatternKind::Navigation => "moving between pages via menus, breadcrumbs and back navigation",
        PatternKind::Search => "typing plausible queries and scanning the results",
        PatternKind::Social => "liking, sharing and reading comments",
        PatternKind::ECommerce => "viewing products, comparing prices and adding items to the cart",
        PatternKind::Custom => "any other plausible interaction specific to this page",
    }
}

/// 提示词输入
pub struct PromptInput<'a> {
    pub target: &'a str,
    pub session_seconds: u64,
    pub page_elements: &'a [String],
    pub enabled_kinds: &'a [PatternKind],
    pub desired_count: usize,
    pub user_interests: Vec<&'a str>,
    pub recent: &'a [RecentPattern],
}

pub fn build_prompt(input: &PromptInput<'_>) -> String {
    let kinds: Vec<&str> = input.enabled_kinds.iter().map(|k| k.as_str()).collect();
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You generate realistic user behavior patterns for a synthetic browsing session."
    );
    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Target URL: {}", input.target);
    let _ = writeln!(prompt, "Session duration: {} seconds", input.session_seconds);
    let _ = writeln!(prompt, "Page elements: {}", input.page_elements.join(", "));
    let _ = writeln!(prompt, "Allowed behavior types: {}", kinds.join(", "));
    if !input.user_interests.is_empty() {
        let _ = writeln!(prompt, "User interests: {}", input.user_interests.join(", "));
    }
    let _ = writeln!(prompt);
    let _ = writeln!(
        prompt,
        "Generate {} behavior patterns. Each needs a type, optional target_element, an action \
         description, parameters (duration in seconds, optional bounds {{x, y, width, height}}, \
         profile_compatibility and context_relevance in [0, 1]), a confidence in [0, 1] and a \
         short reasoning.",
        input.desired_count
    );

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Focus per type:");
    for kind in input.enabled_kinds {
        let _ = writeln!(prompt, "- {}: {}", kind.as_str(), kind_focus(*kind));
    }

    if !input.recent.is_empty() {
        let _ = writeln!(prompt);
        let _ = writeln!(
            prompt,
            "Recently performed (avoid repeating the same sequence):"
        );
        for r in input.recent {
            let _ = writeln!(prompt, "- {} ({:.2}): {}", r.kind, r.confidence, r.action);
        }
    }

    let _ = writeln!(prompt);
    let _ = writeln!(prompt, "Respond with a single JSON object matching this schema:");
    prompt.push_str(&response_schema_json());
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_contains_context() {
        let elements = vec!["feed".to_string(), "post".to_string()];
        let recent = vec![RecentPattern {
            kind: PatternKind::Social,
            action: "like the first post".into(),
            confidence: 0.9,
        }];
        let prompt = build_prompt(&PromptInput {
            target: "https://example.com/social",
            session_seconds: 120,
            page_elements: &elements,
            enabled_kinds: &[PatternKind::Social, PatternKind::Scrolling],
            desired_count: 3,
            user_interests: vec!["news"],
            recent: &recent,
        });
        assert!(prompt.contains("https://example.com/social"));
        assert!(prompt.contains("120 seconds"));
        assert!(prompt.contains("feed, post"));
        assert!(prompt.contains("social, scrolling"));
        assert!(prompt.contains("Generate 3 behavior patterns"));
        assert!(prompt.contains("like the first post"));
        assert!(prompt.contains("\"behaviors\""));
        assert!(!prompt.contains("e-commerce:"));
    }
}
