//! fsm-agent - 有限状态机驱动的 ReAct 智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时（从配置组装编排器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、运行状态、主控状态机
//! - **llm**: 模型服务抽象与实现（Responses API / Mock）
//! - **memory**: 对话记录
//! - **observability**: 日志初始化与 Tracer
//! - **react**: Router、Planner、ReAct 执行循环
//! - **tools**: 工具注册表与内置工具（calculator、lookup_doc）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use crate::core::{Orchestrator, RunOutcome, RunState};
