//! 行为模式：Provider 提出的单个用户动作描述（实现前）
//!
//! 创建后不可变：字段私有，只读访问；置信度在构造时校验。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 行为类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "kebab-case")]
pub enum PatternKind {
    Browsing,
    Clicking,
    Scrolling,
    #[serde(alias = "form_filling")]
    FormFilling,
    Navigation,
    Search,
    Social,
    #[serde(alias = "ecommerce", alias = "e_commerce")]
    ECommerce,
    Custom,
}

impl PatternKind {
    pub const ALL: [PatternKind; 9] = [
        PatternKind::Browsing,
        PatternKind::Clicking,
        PatternKind::Scrolling,
        PatternKind::FormFilling,
        PatternKind::Navigation,
        PatternKind::Search,
        PatternKind::Social,
        PatternKind::ECommerce,
        PatternKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Browsing => "browsing",
            PatternKind::Clicking => "clicking",
            PatternKind::Scrolling => "scrolling",
            PatternKind::FormFilling => "form-filling",
            PatternKind::Navigation => "navigation",
            PatternKind::Search => "search",
            PatternKind::Social => "social",
            PatternKind::ECommerce => "e-commerce",
            PatternKind::Custom => "custom",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 未知的行为类型字符串
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown behavior kind `{0}`")]
pub struct UnknownKind(pub String);

impl FromStr for PatternKind {
    type Err = UnknownKind;

    /// 大小写、`-`、`_`、空格不敏感：`form_filling` / `Form-Filling` / `ecommerce` 均可
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        PatternKind::ALL
            .into_iter()
            .find(|k| k.as_str().replace('-', "") == normalized)
            .ok_or_else(|| UnknownKind(s.to_string()))
    }
}

/// 置信度越界（NaN 或不在 [0, 1]）
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("confidence {0} outside [0, 1]")]
pub struct InvalidConfidence(pub f64);

/// 交互基准时长缺省值（秒），Provider 未给出 `parameters.duration` 时使用
pub const DEFAULT_BASELINE_DURATION_SECS: f64 = 2.0;

/// 单个行为模式
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BehaviorPattern {
    kind: PatternKind,
    target_element: Option<String>,
    action: String,
    parameters: BTreeMap<String, Value>,
    confidence: f64,
    reasoning: String,
    created_at: DateTime<Utc>,
    provider: String,
}

impl BehaviorPattern {
    pub fn new(
        kind: PatternKind,
        action: impl Into<String>,
        confidence: f64,
        provider: impl Into<String>,
    ) -> Result<Self, InvalidConfidence> {
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(InvalidConfidence(confidence));
        }
        Ok(Self {
            kind,
            target_element: None,
            action: action.into(),
            parameters: BTreeMap::new(),
            confidence,
            reasoning: String::new(),
            created_at: Utc::now(),
            provider: provider.into(),
        })
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_element = Some(target.into());
        self
    }

    pub fn with_parameters(mut self, parameters: BTreeMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }

    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    pub fn target_element(&self) -> Option<&str> {
        self.target_element.as_deref()
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn parameters(&self) -> &BTreeMap<String, Value> {
        &self.parameters
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// 读取数值型提示（如 `context_relevance`），缺失或非数值返回 None，结果截断到 [0, 1]
    pub fn hint(&self, key: &str) -> Option<f64> {
        self.parameters
            .get(key)
            .and_then(Value::as_f64)
            .filter(|v| v.is_finite())
            .map(|v| v.clamp(0.0, 1.0))
    }

    /// 基准时长（秒）：`parameters.duration` 为正数时采用，否则取缺省值
    pub fn baseline_duration(&self) -> f64 {
        self.parameters
            .get("duration")
            .and_then(Value::as_f64)
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(DEFAULT_BASELINE_DURATION_SECS)
    }
}
