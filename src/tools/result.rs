//! 工具结果：序列化为 `{"ok": true, ...}` / `{"ok": false, "error": "..."}` 的结构化 Observation

use serde_json::{Map, Value};
use thiserror::Error;

/// 工具执行结果（业务层面的成功 / 失败，均是正常返回值）
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    /// 成功：附带的字段与 ok:true 合并输出
    Success(Map<String, Value>),
    /// 失败：输出 ok:false 与 error 文本
    Failure(String),
}

impl ToolResult {
    pub fn success(key: &str, value: impl Into<Value>) -> Self {
        let mut fields = Map::new();
        fields.insert(key.to_string(), value.into());
        Self::Success(fields)
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure(error.into())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn to_value(&self) -> Value {
        let mut obj = Map::new();
        match self {
            Self::Success(fields) => {
                obj.insert("ok".into(), Value::Bool(true));
                for (k, v) in fields {
                    if k != "ok" {
                        obj.insert(k.clone(), v.clone());
                    }
                }
            }
            Self::Failure(error) => {
                obj.insert("ok".into(), Value::Bool(false));
                obj.insert("error".into(), Value::String(error.clone()));
            }
        }
        Value::Object(obj)
    }

    /// Observation 文本（写回对话日志的 tool_output.output）
    pub fn to_payload(&self) -> String {
        self.to_value().to_string()
    }
}

/// 工具自身可返回的故障；由注册表转换为 bad arguments / execution failed 结果
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolFault {
    #[error("{0}")]
    BadArguments(String),

    #[error("{category}: {message}")]
    Failed { category: String, message: String },
}

impl ToolFault {
    pub fn failed(category: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failed {
            category: category.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for ToolFault {
    fn from(e: serde_json::Error) -> Self {
        Self::BadArguments(e.to_string())
    }
}
