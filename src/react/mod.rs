//! 认知层：Router、Planner、ReAct 执行循环与过程事件

pub mod events;
pub mod executor;
pub mod parse;
pub mod planner;
pub mod prompts;
pub mod router;

pub use events::ReactEvent;
pub use executor::{
    classify_response, ExecutionOutcome, Executor, ExecutorConfig, LoopExit, StepOutcome, MAX_STEPS_FALLBACK,
};
pub use planner::{render_plan, PlanStep, Planner};
pub use router::{Route, RouteDecision, Router};
