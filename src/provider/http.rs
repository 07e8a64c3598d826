//! 通用 HTTP Provider
//!
//! POST `{endpoint}/generate`，body 为提示词与会话上下文；响应体直接作为行为 JSON 交给 schema 校验。

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use super::traits::{
    PatternProvider, ProviderError, ProviderRequest, ProviderResponse, RecentPattern,
};
use crate::model::{PatternKind, UserProfile};

pub struct HttpProvider {
    name: String,
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateBody<'a> {
    prompt: &'a str,
    session_id: &'a str,
    context: GenerateContext<'a>,
    adaptive_data: &'a [RecentPattern],
}

#[derive(Serialize)]
struct GenerateContext<'a> {
    target_url: &'a str,
    session_duration: u64,
    interaction_count: usize,
    page_elements: &'a [String],
    behavior_types: &'a [PatternKind],
    max_patterns: usize,
    user_profile: &'a UserProfile,
}

impl HttpProvider {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: Option<String>,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ProviderError::Permanent(e.to_string()))?;
        Ok(Self {
            name: name.into(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    pub fn url(&self) -> String {
        format!("{}/generate", self.endpoint)
    }
}

#[async_trait]
impl PatternProvider for HttpProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let body = GenerateBody {
            prompt: &request.prompt,
            session_id: &request.session_id,
            context: GenerateContext {
                target_url: &request.target,
                session_duration: request.session_seconds,
                interaction_count: request.interaction_count,
                page_elements: &request.page_elements,
                behavior_types: &request.enabled_kinds,
                max_patterns: request.desired_count,
                user_profile: &request.user_profile,
            },
            adaptive_data: &request.recent_patterns,
        };

        let mut builder = self.client.post(self.url()).json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = builder.send().await.map_err(|e| {
            if e.is_builder() {
                ProviderError::Permanent(e.to_string())
            } else {
                ProviderError::Transient(e.to_string())
            }
        })?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        if !status.is_success() {
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }
        Ok(ProviderResponse::new(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_trims_trailing_slash() {
        let p = HttpProvider::new("h", "http://localhost:9000/", None, Duration::from_secs(5)).unwrap();
        assert_eq!(p.url(), "http://localhost:9000/generate");
        assert_eq!(p.name(), "h");
    }
}
