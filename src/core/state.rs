//! 状态定义：会话阶段与对外投影
//!
//! 编排器内部持有完整状态，通过 watch 通道投影出轻量的 SessionStatus 供调用方轮询。

use serde::Serialize;

use crate::model::SessionId;

/// 会话阶段：Idle → Initializing → Running → Draining → Completed | Failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Initializing,
    Running,
    Draining,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Initializing => "initializing",
            SessionPhase::Running => "running",
            SessionPhase::Draining => "draining",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }

    /// 合法迁移；Running 可以直接进入 Draining（预算用尽、取消或连续失败）
    pub fn can_transition_to(&self, next: SessionPhase) -> bool {
        use SessionPhase::*;
        matches!(
            (self, next),
            (Idle, Initializing)
                | (Initializing, Running)
                | (Initializing, Draining)
                | (Running, Draining)
                | (Draining, Completed)
                | (Draining, Failed)
        )
    }
}

/// 对外投影：阶段、交互数、连续失败数、最近错误
#[derive(Clone, Debug, Serialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    pub phase: SessionPhase,
    pub interactions: usize,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

impl SessionStatus {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            phase: SessionPhase::Idle,
            interactions: 0,
            consecutive_failures: 0,
            last_error: None,
        }
    }
}
