//! 会话监管：每个会话一个取消令牌（全局关闭令牌的子令牌）
//!
//! 全局关闭会级联取消所有会话；单个会话也可按 ID 单独停止。
//! 登记项由 [`SessionLease`] 持有，lease drop（正常结束、panic 展开或任务被 abort）时自动移除。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::model::SessionId;

#[derive(Debug)]
pub struct SessionSupervisor {
    root: CancellationToken,
    sessions: Mutex<HashMap<SessionId, CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// 为会话登记一个子令牌
    pub fn register(&self, session_id: &SessionId) -> CancellationToken {
        let token = self.root.child_token();
        self.sessions.lock().insert(session_id.clone(), token.clone());
        token
    }

    /// 登记会话并返回 lease；lease 存活期间会话计入 active()
    pub fn lease(self: &Arc<Self>, session_id: &SessionId) -> (SessionLease, CancellationToken) {
        let token = self.register(session_id);
        let lease = SessionLease {
            supervisor: Arc::clone(self),
            session_id: session_id.clone(),
        };
        (lease, token)
    }

    /// 会话结束后移除
    pub fn release(&self, session_id: &SessionId) {
        self.sessions.lock().remove(session_id);
    }

    /// 停止单个会话；会话不存在时返回 false
    pub fn cancel(&self, session_id: &SessionId) -> bool {
        match self.sessions.lock().get(session_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// 停止全部会话
    pub fn cancel_all(&self) {
        self.root.cancel();
    }

    pub fn active(&self) -> usize {
        self.sessions.lock().len()
    }
}

/// 会话登记凭证：drop 时从监管表移除
#[derive(Debug)]
pub struct SessionLease {
    supervisor: Arc<SessionSupervisor>,
    session_id: SessionId,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.supervisor.release(&self.session_id);
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}
