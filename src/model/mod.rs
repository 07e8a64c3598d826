//! 数据模型：行为模式、用户画像、会话上下文、交互

pub mod context;
pub mod interaction;
pub mod pattern;
pub mod profile;

pub use context::{page_elements, SessionContext, SessionId, RECENT_KINDS_WINDOW};
pub use interaction::{
    Interaction, DEFAULT_MAX_DURATION_SECS, MAX_INTENSITY, MIN_DURATION_SECS, MIN_INTENSITY,
};
pub use pattern::{
    BehaviorPattern, InvalidConfidence, PatternKind, UnknownKind, DEFAULT_BASELINE_DURATION_SECS,
};
pub use profile::{resolve_profile, BehaviorStyle, UserProfile};
