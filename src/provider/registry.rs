//! Provider 注册表
//!
//! 启动时按 `[[provider.entries]]` 顺序构造一次，之后以 Arc 注入 ProviderClient；顺序即回退优先级。

use std::sync::Arc;

use crate::config::{ProviderEntry, ProviderSection};
use crate::core::error::FlouError;

use super::http::HttpProvider;
use super::openai::OpenAiProvider;
use super::scripted::ScriptedProvider;
use super::traits::PatternProvider;

const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn PatternProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加到优先级末尾
    pub fn with(mut self, provider: Arc<dyn PatternProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn register(&mut self, provider: Arc<dyn PatternProvider>) {
        self.providers.push(provider);
    }

    pub fn providers(&self) -> &[Arc<dyn PatternProvider>] {
        &self.providers
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// 按配置构造；没有任何条目时退回 Scripted 演示 Provider
    pub fn from_config(section: &ProviderSection) -> Result<Self, FlouError> {
        let mut registry = Self::new();
        for entry in &section.entries {
            registry.register(build_entry(entry, section)?);
        }
        if registry.is_empty() {
            tracing::warn!("No providers configured, falling back to the scripted demo provider");
            registry.register(Arc::new(ScriptedProvider::demo()));
        }
        tracing::info!(providers = ?registry.names(), "Provider registry ready");
        Ok(registry)
    }
}

fn api_key(entry: &ProviderEntry) -> Option<String> {
    entry
        .api_key_env
        .as_deref()
        .and_then(|var| std::env::var(var).ok())
        .filter(|k| !k.is_empty())
}

fn build_entry(
    entry: &ProviderEntry,
    section: &ProviderSection,
) -> Result<Arc<dyn PatternProvider>, FlouError> {
    match entry.kind.as_str() {
        "openai" => {
            let var = entry.api_key_env.as_deref().unwrap_or(DEFAULT_API_KEY_ENV);
            let key = std::env::var(var).ok().filter(|k| !k.is_empty()).ok_or_else(|| {
                FlouError::Config(format!(
                    "provider `{}`: environment variable {var} is not set",
                    entry.name
                ))
            })?;
            let model = entry.model.as_deref().unwrap_or(DEFAULT_OPENAI_MODEL);
            Ok(Arc::new(OpenAiProvider::new(
                entry.name.clone(),
                entry.base_url.as_deref(),
                model,
                &key,
                entry.temperature,
            )))
        }
        "http" => {
            let endpoint = entry.endpoint.clone().ok_or_else(|| {
                FlouError::Config(format!("provider `{}`: missing endpoint", entry.name))
            })?;
            let provider = HttpProvider::new(
                entry.name.clone(),
                endpoint,
                api_key(entry),
                section.request_timeout(),
            )
            .map_err(|e| FlouError::Config(format!("provider `{}`: {e}", entry.name)))?;
            Ok(Arc::new(provider))
        }
        "scripted" => Ok(Arc::new(ScriptedProvider::demo().renamed(&entry.name))),
        other => Err(FlouError::Config(format!(
            "provider `{}`: unknown kind `{other}`",
            entry.name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: &str) -> ProviderEntry {
        ProviderEntry {
            name: name.into(),
            kind: kind.into(),
            model: None,
            base_url: None,
            endpoint: Some("http://localhost:9000".into()),
            api_key_env: None,
            temperature: 0.7,
        }
    }

    #[test]
    fn test_priority_order_preserved() {
        let section = ProviderSection {
            entries: vec![entry("primary", "http"), entry("backup", "scripted")],
            ..Default::default()
        };
        let registry = ProviderRegistry::from_config(&section).unwrap();
        assert_eq!(registry.names(), vec!["primary", "backup"]);
    }

    #[test]
    fn test_empty_config_uses_demo() {
        let registry = ProviderRegistry::from_config(&ProviderSection::default()).unwrap();
        assert_eq!(registry.names(), vec!["scripted"]);
    }

    #[test]
    fn test_openai_without_key_is_config_error() {
        let mut e = entry("llm", "openai");
        e.api_key_env = Some("FLOU_TEST_KEY_THAT_IS_NOT_SET".into());
        let section = ProviderSection {
            entries: vec![e],
            ..Default::default()
        };
        assert!(matches!(
            ProviderRegistry::from_config(&section),
            Err(FlouError::Config(_))
        ));
    }
}
