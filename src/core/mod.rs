//! 核心编排层：错误分类、运行状态与转移表、主控状态机

pub mod error;
pub mod orchestrator;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{
    next_after_route, AgentConfig, Orchestrator, RunOutcome, NO_ANSWER, STOPPED_ANSWER,
};
pub use state::{RunState, StateMachine};
