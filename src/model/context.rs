//! 会话上下文：目标、预算、用户画像、交互计数、最近行为类型窗口
//!
//! 每个会话独占一份 SessionContext；实现交互时复制一份快照放进 Interaction。

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{PatternKind, UserProfile};

/// 最近行为类型窗口长度
pub const RECENT_KINDS_WINDOW: usize = 5;

/// 会话 ID（uuid v4）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionContext {
    pub session_id: SessionId,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub budget: Duration,
    pub user_profile: UserProfile,
    /// 目标页面上可交互的元素（发给 Provider 作为上下文）
    pub page_elements: Vec<String>,
    interaction_count: usize,
    recent_kinds: VecDeque<PatternKind>,
}

impl SessionContext {
    pub fn new(
        session_id: SessionId,
        target: impl Into<String>,
        budget: Duration,
        user_profile: UserProfile,
    ) -> Self {
        let target = target.into();
        let page_elements = page_elements(&target);
        Self {
            session_id,
            target,
            started_at: Utc::now(),
            budget,
            user_profile,
            page_elements,
            interaction_count: 0,
            recent_kinds: VecDeque::with_capacity(RECENT_KINDS_WINDOW),
        }
    }

    pub fn interaction_count(&self) -> usize {
        self.interaction_count
    }

    pub fn recent_kinds(&self) -> impl Iterator<Item = PatternKind> + '_ {
        self.recent_kinds.iter().copied()
    }

    pub fn recently_used(&self, kind: PatternKind) -> bool {
        self.recent_kinds.contains(&kind)
    }

    /// 记录一次已实现的交互：计数 +1，类型进入最近窗口（超出窗口时丢弃最旧）
    pub fn record_interaction(&mut self, kind: PatternKind) {
        self.interaction_count += 1;
        if self.recent_kinds.len() == RECENT_KINDS_WINDOW {
            self.recent_kinds.pop_front();
        }
        self.recent_kinds.push_back(kind);
    }
}

/// 按 URL 路径推断页面元素：shop/store → 商品类，blog/article → 文章类，social → 信息流类
pub fn page_elements(target: &str) -> Vec<String> {
    let path = target
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(target)
        .split_once('/')
        .map(|(_, p)| p.to_lowercase())
        .unwrap_or_default();

    let elements: &[&str] = if path.contains("shop") || path.contains("store") {
        &["product-grid", "add-to-cart", "price", "reviews"]
    } else if path.contains("blog") || path.contains("article") {
        &["article-content", "comments", "share-buttons", "related-posts"]
    } else if path.contains("social") {
        &["feed", "post", "like-button", "comment-section"]
    } else {
        &["header", "navigation", "main-content", "search-box", "links", "footer"]
    };
    elements.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SessionContext {
        SessionContext::new(
            SessionId::from("s-1"),
            "https://example.com/",
            Duration::from_secs(60),
            UserProfile::casual_browser(),
        )
    }

    #[test]
    fn test_recent_kinds_window_bounded() {
        let mut c = ctx();
        let kinds = [
            PatternKind::Browsing,
            PatternKind::Clicking,
            PatternKind::Scrolling,
            PatternKind::Search,
            PatternKind::Social,
            PatternKind::Navigation,
        ];
        for k in kinds {
            c.record_interaction(k);
        }
        assert_eq!(c.interaction_count(), 6);
        let recent: Vec<_> = c.recent_kinds().collect();
        assert_eq!(recent, kinds[1..].to_vec());
        assert!(!c.recently_used(PatternKind::Browsing));
        assert!(c.recently_used(PatternKind::Navigation));
    }

    #[test]
    fn test_page_elements_by_path() {
        assert!(page_elements("https://x.com/shop/items").contains(&"add-to-cart".to_string()));
        assert!(page_elements("https://x.com/blog/post-1").contains(&"comments".to_string()));
        assert!(page_elements("http://x.com/social").contains(&"feed".to_string()));
        assert!(page_elements("https://shop.x.com").contains(&"main-content".to_string()));
    }
}
