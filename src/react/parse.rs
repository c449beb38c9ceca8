//! 从模型文本中提取 JSON
//!
//! 依次尝试：整段即 JSON -> ```json 代码块 -> 首个 `{` 到最后一个 `}` 的片段。

use serde_json::{Map, Value};

/// 提取 JSON 值（对象或数组）；无法解析时返回 None
pub fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        let block = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        if let Ok(v) = serde_json::from_str::<Value>(block.trim()) {
            return Some(v);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&trimmed[start..=end]).ok()
}

/// 提取 JSON 对象
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    match extract_json(text)? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// 解析工具调用参数；空文本视为空参数，非对象或畸形 JSON 返回 Err
pub fn parse_arguments(raw: &str) -> Result<Map<String, Value>, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(Value::Null) => Ok(Map::new()),
        Ok(other) => Err(format!("arguments are not an object: {other}")),
        Err(e) => Err(e.to_string()),
    }
}
