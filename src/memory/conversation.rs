//! 短期记忆：对话条目与只追加的对话日志
//!
//! 日志是每次模型请求回放的完整上下文，插入顺序即语义；不提供删除或修改接口。

use serde::{Deserialize, Serialize};

/// 消息角色（与模型服务的 role 字段一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Developer,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::Developer => "developer",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// 对话条目：消息 / 模型发起的工具调用 / 引擎回填的工具输出
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    Message {
        role: Role,
        content: String,
    },
    ToolCall {
        name: String,
        /// 序列化后的参数（通常是 JSON 文本，可能畸形）
        arguments: String,
        call_id: Option<String>,
        /// 服务端给该条目分配的 id，call_id 缺失时用于关联
        item_id: Option<String>,
    },
    ToolOutput {
        call_id: String,
        output: String,
    },
}

impl ConversationItem {
    pub fn system(content: impl Into<String>) -> Self {
        Self::message(Role::System, content)
    }

    pub fn developer(content: impl Into<String>) -> Self {
        Self::message(Role::Developer, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::message(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::message(Role::Assistant, content)
    }

    pub fn message(role: Role, content: impl Into<String>) -> Self {
        Self::Message {
            role,
            content: content.into(),
        }
    }

    pub fn tool_call(
        name: impl Into<String>,
        arguments: impl Into<String>,
        call_id: impl Into<String>,
    ) -> Self {
        Self::ToolCall {
            name: name.into(),
            arguments: arguments.into(),
            call_id: Some(call_id.into()),
            item_id: None,
        }
    }

    pub fn tool_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ToolOutput {
            call_id: call_id.into(),
            output: output.into(),
        }
    }

    pub fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall { .. })
    }
}

/// 对话日志：只追加，snapshot 返回独立副本
#[derive(Clone, Debug, Default)]
pub struct ConversationLog {
    items: Vec<ConversationItem>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, item: ConversationItem) {
        self.items.push(item);
    }

    pub fn append_all(&mut self, items: impl IntoIterator<Item = ConversationItem>) {
        self.items.extend(items);
    }

    /// 防御性拷贝：可交给其他读者，不受后续追加影响
    pub fn snapshot(&self) -> Vec<ConversationItem> {
        self.items.clone()
    }

    pub fn items(&self) -> &[ConversationItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_is_independent_copy() {
        let mut log = ConversationLog::new();
        log.append(ConversationItem::system("sys"));
        let snap = log.snapshot();
        log.append(ConversationItem::user("hi"));
        assert_eq!(snap.len(), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(&log.items()[..1], snap.as_slice());
    }

    #[test]
    fn test_append_all_keeps_order() {
        let mut log = ConversationLog::new();
        log.append(ConversationItem::user("q"));
        log.append_all(vec![
            ConversationItem::tool_call("calculator", "{}", "c1"),
            ConversationItem::tool_output("c1", "{\"ok\":true}"),
        ]);
        assert!(log.items()[1].is_tool_call());
        assert_eq!(
            log.items()[2],
            ConversationItem::tool_output("c1", "{\"ok\":true}")
        );
    }

    #[test]
    fn test_item_serializes_with_type_tag() {
        let v = serde_json::to_value(ConversationItem::developer("Plan:")).unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["role"], "developer");
    }
}
