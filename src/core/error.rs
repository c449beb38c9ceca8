//! Agent 错误类型
//!
//! 除 ModelService / Config / IllegalTransition 外，其余错误均在本地恢复：
//! 折叠为工具 Observation（ok:false）或安全默认值 / 固定兜底回答，绝不抛给调用方。

use thiserror::Error;

use crate::llm::ModelError;

/// Agent 运行过程中可能出现的错误（模型输出畸形、工具失败、步数耗尽等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// Router 输出无法解析为 {route, tools, reason}
    #[error("router decode error: {0}")]
    RouterDecode(String),

    /// Planner 输出无法解析出任何合法步骤
    #[error("planner decode error: {0}")]
    PlannerDecode(String),

    #[error("unknown tool: {0}")]
    ToolNotFound(String),

    #[error("bad arguments: {0}")]
    ToolArguments(String),

    /// 工具内部故障，携带故障类别与消息
    #[error("execution failed: {category}: {message}")]
    ToolExecution { category: String, message: String },

    /// 模型既没有工具调用也没有可用文本
    #[error("empty model response at step {step}")]
    EmptyModelResponse { step: usize },

    #[error("step budget of {budget} exhausted without a final answer")]
    StepBudgetExceeded { budget: usize },

    /// DIRECT_ANSWER 状态下模型未给出任何文本
    #[error("direct answer was empty")]
    NoDirectAnswer,

    #[error("model service error: {0}")]
    ModelService(#[from] ModelError),

    #[error("illegal state transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("config error: {0}")]
    ConfigError(String),
}

impl AgentError {
    /// 兜底事件中使用的稳定标签，测试据此断言触发的是哪一种兜底
    pub fn tag(&self) -> &'static str {
        match self {
            AgentError::RouterDecode(_) => "router_decode",
            AgentError::PlannerDecode(_) => "planner_decode",
            AgentError::ToolNotFound(_) => "tool_not_found",
            AgentError::ToolArguments(_) => "tool_arguments",
            AgentError::ToolExecution { .. } => "tool_execution",
            AgentError::EmptyModelResponse { .. } => "empty_model_response",
            AgentError::StepBudgetExceeded { .. } => "step_budget_exceeded",
            AgentError::NoDirectAnswer => "no_direct_answer",
            AgentError::ModelService(_) => "model_service",
            AgentError::IllegalTransition { .. } => "illegal_transition",
            AgentError::ConfigError(_) => "config",
        }
    }
}
