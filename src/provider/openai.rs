//! OpenAI 兼容 Provider
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；system 消息固定要求只输出 JSON，
//! user 消息为 ProviderRequest 中已渲染的提示词。

use async_openai::config::OpenAIConfig;
use async_openai::error::OpenAIError;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use super::traits::{PatternProvider, ProviderError, ProviderRequest, ProviderResponse};

const SYSTEM_PROMPT: &str = "You are a web behavior simulation assistant. \
    Reply with exactly one JSON object and nothing else.";

pub struct OpenAiProvider {
    name: String,
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAiProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: Option<&str>,
        model: &str,
        api_key: &str,
        temperature: f32,
    ) -> Self {
        let config = match base_url {
            Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
            None => OpenAIConfig::new().with_api_key(api_key),
        };
        Self {
            name: name.into(),
            client: Client::with_config(config),
            model: model.to_string(),
            temperature,
        }
    }

    fn messages(&self, prompt: &str) -> Result<Vec<ChatCompletionRequestMessage>, ProviderError> {
        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_PROMPT)
            .build()
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt.to_string())
            .build()
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;
        Ok(vec![
            ChatCompletionRequestMessage::System(system),
            ChatCompletionRequestMessage::User(user),
        ])
    }
}

/// 401/403/404 与参数错误为永久性；限流、5xx 与网络错误为暂时性
fn classify(err: OpenAIError) -> ProviderError {
    match err {
        OpenAIError::Reqwest(e) => match e.status() {
            Some(status) => ProviderError::from_status(status.as_u16(), &e.to_string()),
            None => ProviderError::Transient(e.to_string()),
        },
        OpenAIError::ApiError(api) => {
            let tag = format!(
                "{} {}",
                api.r#type.as_deref().unwrap_or_default(),
                api.code.as_deref().unwrap_or_default()
            )
            .to_lowercase();
            let permanent = ["invalid_api_key", "authentication", "permission", "not_found", "invalid_request"]
                .iter()
                .any(|t| tag.contains(t));
            if permanent {
                ProviderError::Permanent(api.message)
            } else {
                ProviderError::Transient(api.message)
            }
        }
        OpenAIError::InvalidArgument(msg) => ProviderError::Permanent(msg),
        other => ProviderError::Transient(other.to_string()),
    }
}

#[async_trait]
impl PatternProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let req = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .temperature(self.temperature)
            .messages(self.messages(&request.prompt)?)
            .build()
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;

        let response = self.client.chat().create(req).await.map_err(classify)?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| ProviderError::Transient("empty completion".to_string()))?;

        tracing::debug!(
            provider = %self.name,
            session_id = %request.session_id,
            chars = content.len(),
            "Completion received"
        );
        Ok(ProviderResponse::new(content))
    }
}
