//! Provider 响应的严格校验
//!
//! 期望格式 `{"behaviors": [...], "insights": {...}}`。逐条校验：不合法的条目单独拒绝并记录 ParseError，
//! 其余条目照常使用；一条都不可用时整批报 EmptyBatch。未知类型一律拒绝，不回退到默认类型。

use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use schemars::{schema_for, JsonSchema};
use serde_json::{Map, Value};

use crate::core::error::ParseError;
use crate::model::{BehaviorPattern, PatternKind};

/// 响应格式（仅用于生成 JSON Schema 拼入提示词）
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ResponseFormat {
    behaviors: Vec<BehaviorFormat>,
    /// 可选：对本批行为的整体分析，会合并进自适应记忆
    insights: Option<BTreeMap<String, Value>>,
}

#[allow(dead_code)]
#[derive(JsonSchema)]
struct BehaviorFormat {
    /// 行为类型
    #[schemars(rename = "type")]
    kind: PatternKind,
    /// 目标元素选择器或描述
    target_element: Option<String>,
    /// 动作描述
    action: String,
    /// 参数：duration（秒）、bounds、profile_compatibility、context_relevance 等
    parameters: Option<BTreeMap<String, Value>>,
    /// 0.0 - 1.0
    confidence: f64,
    reasoning: Option<String>,
}

/// 返回响应格式的 JSON Schema 字符串
pub fn response_schema_json() -> String {
    let schema = schema_for!(ResponseFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// 一次响应的解析结果
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub patterns: Vec<BehaviorPattern>,
    pub rejected: Vec<ParseError>,
    pub insights: Option<Map<String, Value>>,
}

static FENCE_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// 去掉 LLM 常见的 ```json ... ``` 包裹
fn strip_code_fence(body: &str) -> &str {
    let trimmed = body.trim();
    let re = FENCE_RE.get_or_init(|| Regex::new(r"(?s)^```[a-zA-Z]*\s*(.*?)\s*```$").ok());
    match re.as_ref().and_then(|re| re.captures(trimmed)) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(trimmed),
        None => trimmed,
    }
}

/// 解析整批响应
pub fn parse_payload(body: &str, provider: &str) -> Result<ParsedBatch, ParseError> {
    let root: Value = serde_json::from_str(strip_code_fence(body))
        .map_err(|e| ParseError::InvalidJson(e.to_string()))?;
    let Value::Object(mut root) = root else {
        return Err(ParseError::MissingBehaviors);
    };
    let Some(Value::Array(entries)) = root.remove("behaviors") else {
        return Err(ParseError::MissingBehaviors);
    };

    let mut batch = ParsedBatch {
        insights: match root.remove("insights") {
            Some(Value::Object(map)) => Some(map),
            _ => None,
        },
        ..Default::default()
    };

    for (index, entry) in entries.iter().enumerate() {
        match parse_entry(index, entry, provider) {
            Ok(pattern) => batch.patterns.push(pattern),
            Err(e) => {
                tracing::debug!(provider, error = %e, "Rejected behavior entry");
                batch.rejected.push(e);
            }
        }
    }

    if batch.patterns.is_empty() {
        return Err(ParseError::EmptyBatch {
            rejected: batch.rejected.len(),
        });
    }
    Ok(batch)
}

/// 校验单条记录
pub fn parse_entry(index: usize, entry: &Value, provider: &str) -> Result<BehaviorPattern, ParseError> {
    let obj = entry.as_object().ok_or(ParseError::WrongType {
        index,
        field: "entry",
    })?;

    let raw_kind = obj
        .get("type")
        .or_else(|| obj.get("kind"))
        .ok_or(ParseError::MissingField { index, field: "type" })?
        .as_str()
        .ok_or(ParseError::WrongType { index, field: "type" })?;
    let kind: PatternKind = raw_kind.parse().map_err(|_| ParseError::UnknownKind {
        index,
        kind: raw_kind.to_string(),
    })?;

    let action = required_str(obj, index, "action")?;

    let confidence = obj
        .get("confidence")
        .ok_or(ParseError::MissingField {
            index,
            field: "confidence",
        })?
        .as_f64()
        .ok_or(ParseError::WrongType {
            index,
            field: "confidence",
        })?;

    let mut pattern = BehaviorPattern::new(kind, action, confidence, provider)
        .map_err(|e| ParseError::ConfidenceOutOfRange { index, value: e.0 })?;

    if let Some(target) = optional_str(obj, index, "target_element")? {
        pattern = pattern.with_target(target);
    }
    if let Some(reasoning) = optional_str(obj, index, "reasoning")? {
        pattern = pattern.with_reasoning(reasoning);
    }
    match obj.get("parameters") {
        None | Some(Value::Null) => {}
        Some(Value::Object(params)) => {
            let params: BTreeMap<String, Value> =
                params.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            pattern = pattern.with_parameters(params);
        }
        Some(_) => {
            return Err(ParseError::WrongType {
                index,
                field: "parameters",
            })
        }
    }

    Ok(pattern)
}

fn required_str<'a>(
    obj: &'a Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<&'a str, ParseError> {
    obj.get(field)
        .ok_or(ParseError::MissingField { index, field })?
        .as_str()
        .ok_or(ParseError::WrongType { index, field })
}

fn optional_str<'a>(
    obj: &'a Map<String, Value>,
    index: usize,
    field: &'static str,
) -> Result<Option<&'a str>, ParseError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ParseError::WrongType { index, field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_fenced_payload() {
        let body = "```json\n{\"behaviors\": [{\"type\": \"scrolling\", \"action\": \"scroll down\", \"confidence\": 0.9}]}\n```";
        let batch = parse_payload(body, "p").unwrap();
        assert_eq!(batch.patterns.len(), 1);
        assert_eq!(batch.patterns[0].kind(), PatternKind::Scrolling);
        assert_eq!(batch.patterns[0].provider(), "p");
    }

    #[test]
    fn test_invalid_entries_rejected_individually() {
        let body = json!({
            "behaviors": [
                {"type": "clicking", "action": "click buy", "confidence": 0.8,
                 "target_element": "#buy", "parameters": {"duration": 1.5}},
                {"type": "teleporting", "action": "x", "confidence": 0.9},
                {"type": "search", "confidence": 0.9},
                {"type": "search", "action": "q", "confidence": 1.4},
                {"type": "search", "action": "q", "confidence": "high"},
                {"type": "social", "action": "like", "confidence": 0.7, "parameters": [1, 2]},
                "not an object"
            ],
            "insights": {"trend": "commerce"}
        })
        .to_string();
        let batch = parse_payload(&body, "p").unwrap();
        assert_eq!(batch.patterns.len(), 1);
        assert_eq!(batch.patterns[0].target_element(), Some("#buy"));
        assert_eq!(batch.patterns[0].baseline_duration(), 1.5);
        assert_eq!(batch.rejected.len(), 6);
        assert!(matches!(batch.rejected[0], ParseError::UnknownKind { index: 1, .. }));
        assert!(matches!(
            batch.rejected[1],
            ParseError::MissingField { index: 2, field: "action" }
        ));
        assert!(matches!(
            batch.rejected[2],
            ParseError::ConfidenceOutOfRange { index: 3, .. }
        ));
        assert_eq!(batch.insights.unwrap()["trend"], json!("commerce"));
    }

    #[test]
    fn test_all_invalid_is_empty_batch() {
        let body = json!({"behaviors": [{"type": "nope", "action": "x", "confidence": 0.9}]}).to_string();
        assert_eq!(
            parse_payload(&body, "p").unwrap_err(),
            ParseError::EmptyBatch { rejected: 1 }
        );
        assert_eq!(
            parse_payload("{\"foo\": 1}", "p").unwrap_err(),
            ParseError::MissingBehaviors
        );
        assert!(matches!(
            parse_payload("not json", "p").unwrap_err(),
            ParseError::InvalidJson(_)
        ));
    }

    #[test]
    fn test_schema_mentions_behaviors() {
        let schema = response_schema_json();
        assert!(schema.contains("behaviors"));
        assert!(schema.contains("confidence"));
    }
}
