//! 会话事件：阶段变化、交互实现、tick 失败、Provider 回退、会话结束
//!
//! 通过 broadcast 通道发布；没有订阅者时事件直接丢弃，发送方不受影响。

use serde::Serialize;
use tokio::sync::broadcast;

use super::state::SessionPhase;
use crate::model::PatternKind;

/// 单个会话事件（可序列化为 JSON 供外部观察者展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        session_id: String,
        from: SessionPhase,
        to: SessionPhase,
    },
    InteractionRealized {
        session_id: String,
        kind: PatternKind,
        provider: String,
        intensity: f64,
        duration_secs: f64,
        coordinates: (u32, u32),
    },
    TickFailed {
        session_id: String,
        consecutive: u32,
        category: String,
        error: String,
    },
    /// 当前 Provider 放弃，切换到下一个
    ProviderFallback {
        session_id: String,
        from: String,
        to: String,
        reason: String,
    },
    Completed {
        session_id: String,
        phase: SessionPhase,
        interactions: usize,
        failures: u64,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> &str {
        match self {
            SessionEvent::PhaseChanged { session_id, .. }
            | SessionEvent::InteractionRealized { session_id, .. }
            | SessionEvent::TickFailed { session_id, .. }
            | SessionEvent::ProviderFallback { session_id, .. }
            | SessionEvent::Completed { session_id, .. } => session_id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_subscribe() {
        let bus = EventBus::default();
        bus.publish(SessionEvent::Completed {
            session_id: "lost".into(),
            phase: SessionPhase::Completed,
            interactions: 0,
            failures: 0,
        });

        let mut rx = bus.subscribe();
        bus.publish(SessionEvent::TickFailed {
            session_id: "s".into(),
            consecutive: 1,
            category: "parse".into(),
            error: "bad".into(),
        });
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.session_id(), "s");
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "tick_failed");
    }
}
