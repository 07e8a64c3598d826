//! 交互：实现后的行为模式（坐标、时长、强度、上下文快照）

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{BehaviorPattern, SessionContext, SessionId};

/// 强度下限 / 上限
pub const MIN_INTENSITY: f64 = 0.1;
pub const MAX_INTENSITY: f64 = 1.0;
/// 交互时长下限（秒）；上限由配置给出，缺省 10 秒
pub const MIN_DURATION_SECS: f64 = 0.5;
pub const DEFAULT_MAX_DURATION_SECS: f64 = 10.0;

#[derive(Debug, Clone, Serialize)]
pub struct Interaction {
    pub pattern: Arc<BehaviorPattern>,
    pub coordinates: (u32, u32),
    /// 秒，> 0 且不超过上限
    pub duration_secs: f64,
    /// [0.1, 1.0]
    pub intensity: f64,
    pub context_snapshot: SessionContext,
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
}
