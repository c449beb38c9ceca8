//! 运行过程事件：用于流式展示状态切换、工具调用、观察与回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 状态机进入新状态
    StateChanged { state: String },
    /// 执行循环步数更新（当前第几步）
    StepUpdate { step: usize, max_steps: usize },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 降级处理（阶段 + 错误标签）
    Fallback { stage: String, error: String },
    /// 最终回复的一小段（流式输出）
    MessageChunk { text: String },
    /// 最终回复结束
    MessageDone,
    /// 错误
    Error { text: String },
}
