//! Scripted Provider（测试替身，不调用任何外部服务）
//!
//! 按队列依次返回预设响应或错误；队列耗尽后重复 fallback 响应。记录调用次数与调用时刻，
//! 便于断言重试次数与退避间隔。

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::time::Instant;

use super::traits::{PatternProvider, ProviderError, ProviderRequest, ProviderResponse};

type Scripted = Result<ProviderResponse, ProviderError>;

pub struct ScriptedProvider {
    name: String,
    queue: Mutex<VecDeque<Scripted>>,
    fallback: Mutex<Option<Scripted>>,
    calls: Mutex<Vec<Instant>>,
    last_request: Mutex<Option<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            queue: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            last_request: Mutex::new(None),
        }
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 入队一个成功响应（原始 JSON 文本）
    pub fn push_ok(&self, body: impl Into<String>) -> &Self {
        self.queue.lock().push_back(Ok(ProviderResponse::new(body)));
        self
    }

    pub fn push_err(&self, err: ProviderError) -> &Self {
        self.queue.lock().push_back(Err(err));
        self
    }

    /// 队列耗尽后一直返回该响应
    pub fn repeat_ok(self, body: impl Into<String>) -> Self {
        *self.fallback.lock() = Some(Ok(ProviderResponse::new(body)));
        self
    }

    pub fn repeat_err(self, err: ProviderError) -> Self {
        *self.fallback.lock() = Some(Err(err));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// 每次调用的时刻（tokio 时钟，暂停时钟测试下可精确比较）
    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().clone()
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().clone()
    }

    /// 演示用：无外部 Provider 配置时使用，轮流给出几种常见行为
    pub fn demo() -> Self {
        let body = json!({
            "behaviors": [
                {"type": "browsing", "action": "read the hero section", "confidence": 0.86,
                 "target_element": "main-content",
                 "parameters": {"duration": 2.5, "profile_compatibility": 0.8, "context_relevance": 0.7},
                 "reasoning": "first impression of the page"},
                {"type": "scrolling", "action": "scroll down slowly", "confidence": 0.82,
                 "parameters": {"duration": 1.8, "context_relevance": 0.6},
                 "reasoning": "scanning the page"},
                {"type": "clicking", "action": "open a related link", "confidence": 0.78,
                 "target_element": "links",
                 "parameters": {"duration": 1.0, "bounds": {"x": 200, "y": 300, "width": 400, "height": 40}},
                 "reasoning": "curiosity about related content"},
                {"type": "search", "action": "search for a product name", "confidence": 0.74,
                 "target_element": "search-box",
                 "parameters": {"duration": 3.0, "profile_compatibility": 0.6},
                 "reasoning": "looking for something specific"}
            ],
            "insights": {"source": "scripted-demo"}
        });
        Self::new("scripted").repeat_ok(body.to_string())
    }
}

#[async_trait]
impl PatternProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.lock().push(Instant::now());
        *self.last_request.lock() = Some(request.clone());
        if let Some(next) = self.queue.lock().pop_front() {
            return next;
        }
        self.fallback
            .lock()
            .clone()
            .unwrap_or_else(|| Err(ProviderError::Permanent("script exhausted".to_string())))
    }
}
