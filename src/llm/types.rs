//! 模型服务的请求 / 响应类型
//!
//! 服务边界（如 openai.rs）负责把原始 output items 归一化为 ConversationItem，核心层只看这里的类型。

use serde::Serialize;
use serde_json::Value;

use crate::memory::{ConversationItem, Role};

/// 工具选择模式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    /// 模型可自行决定调用零个或多个工具，或直接输出文本
    Auto,
    /// 禁止调用工具
    None,
}

/// 工具能力描述：交给模型服务，让模型决定何时请求调用
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function",
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// 单次模型请求
#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub input: Vec<ConversationItem>,
    pub tools: Option<Vec<ToolSpec>>,
    pub tool_choice: ToolChoice,
}

impl ModelRequest {
    /// 不带工具的一次性请求（Router / Planner / 直接回答）
    pub fn without_tools(input: Vec<ConversationItem>) -> Self {
        Self {
            input,
            tools: None,
            tool_choice: ToolChoice::None,
        }
    }

    pub fn with_tools(input: Vec<ConversationItem>, tools: Vec<ToolSpec>) -> Self {
        Self {
            input,
            tools: Some(tools),
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// 归一化后的模型响应：有序的 output items（assistant 消息或工具调用）
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ModelResponse {
    pub output: Vec<ConversationItem>,
}

impl ModelResponse {
    pub fn new(output: Vec<ConversationItem>) -> Self {
        Self { output }
    }

    /// 仅含一段 assistant 文本的响应
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(vec![ConversationItem::assistant(content)])
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn tool_calls(&self) -> Vec<&ConversationItem> {
        self.output.iter().filter(|i| i.is_tool_call()).collect()
    }

    /// 拼接所有 assistant 文本：跳过空白片段，以换行连接并去掉首尾空白
    pub fn collect_text(&self) -> String {
        let chunks: Vec<&str> = self
            .output
            .iter()
            .filter_map(|item| match item {
                ConversationItem::Message {
                    role: Role::Assistant,
                    content,
                } if !content.trim().is_empty() => Some(content.as_str()),
                _ => None,
            })
            .collect();
        chunks.join("\n").trim().to_string()
    }
}

/// 流式响应事件：若干文本增量，最后一个 Completed 携带完整响应
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    TextDelta(String),
    Completed(ModelResponse),
}
