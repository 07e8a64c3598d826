//! 行为类型分组：casual（会话早期）、sophisticated（会话后期）、content-heavy（节奏放慢）

use crate::config::SelectionSection;
use crate::model::PatternKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindCategories {
    casual: Vec<PatternKind>,
    sophisticated: Vec<PatternKind>,
    content_heavy: Vec<PatternKind>,
}

impl Default for KindCategories {
    fn default() -> Self {
        Self::from_config(&SelectionSection::default())
    }
}

impl KindCategories {
    pub fn from_config(section: &SelectionSection) -> Self {
        Self {
            casual: section.casual_kinds.clone(),
            sophisticated: section.sophisticated_kinds.clone(),
            content_heavy: section.content_heavy_kinds.clone(),
        }
    }

    pub fn is_casual(&self, kind: PatternKind) -> bool {
        self.casual.contains(&kind)
    }

    pub fn is_sophisticated(&self, kind: PatternKind) -> bool {
        self.sophisticated.contains(&kind)
    }

    pub fn is_content_heavy(&self, kind: PatternKind) -> bool {
        self.content_heavy.contains(&kind)
    }
}
