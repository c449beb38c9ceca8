//! Planner：把请求拆成 1..=6 个有序步骤
//!
//! 计划只作为执行阶段的参考（developer 消息），不会被逐步强制执行。
//! 输出无法解析或没有有效步骤时，返回单步兜底计划。

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::llm::{ModelRequest, ModelService};
use crate::memory::ConversationItem;
use crate::observability::{preview, record_fallback, Tracer};
use crate::react::parse::extract_json;
use crate::react::prompts::PLANNER_SYSTEM;

/// 计划步数上限
pub const MAX_PLAN_STEPS: usize = 6;
pub const FALLBACK_GOAL: &str = "Solve the user's request";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanStep {
    pub id: i64,
    pub goal: String,
    /// 建议工具；空串表示无建议
    pub tool_hint: String,
}

impl PlanStep {
    pub fn fallback() -> Self {
        Self {
            id: 1,
            goal: FALLBACK_GOAL.to_string(),
            tool_hint: String::new(),
        }
    }
}

/// 解析计划 JSON：`{"steps": [...]}` 或直接一个数组。
/// 无效条目（id 非整数、goal 为空）被丢弃；超过 max_steps 的部分截断
pub fn parse_plan(raw: &str, max_steps: usize) -> Result<Vec<PlanStep>, AgentError> {
    let value = extract_json(raw)
        .ok_or_else(|| AgentError::PlannerDecode(format!("no JSON in: {}", preview(raw, 120))))?;

    let entries = match &value {
        Value::Array(list) => list,
        Value::Object(obj) => obj
            .get("steps")
            .and_then(Value::as_array)
            .ok_or_else(|| AgentError::PlannerDecode("missing `steps` array".to_string()))?,
        _ => return Err(AgentError::PlannerDecode("plan is not an object".to_string())),
    };

    let steps: Vec<PlanStep> = entries
        .iter()
        .filter_map(step_from_value)
        .take(max_steps.clamp(1, MAX_PLAN_STEPS))
        .collect();

    if steps.is_empty() {
        return Err(AgentError::PlannerDecode("no valid steps".to_string()));
    }
    Ok(steps)
}

fn step_from_value(entry: &Value) -> Option<PlanStep> {
    let obj = entry.as_object()?;
    let id = obj.get("id")?.as_i64()?;
    let goal = obj.get("goal")?.as_str()?.trim();
    if goal.is_empty() {
        return None;
    }
    let tool_hint = match obj.get("tool_hint") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(other) => other.to_string(),
    };
    Some(PlanStep {
        id,
        goal: goal.to_string(),
        tool_hint,
    })
}

/// 计划指引文本，每步一行：`{id}. {goal} (tool_hint={hint 或 none})`
pub fn render_plan(steps: &[PlanStep]) -> String {
    let mut out = String::from("Plan:");
    for step in steps {
        let hint = if step.tool_hint.is_empty() { "none" } else { step.tool_hint.as_str() };
        out.push_str(&format!("\n{}. {} (tool_hint={})", step.id, step.goal, hint));
    }
    out
}

pub struct Planner {
    model: Arc<dyn ModelService>,
    tracer: Arc<dyn Tracer>,
    max_steps: usize,
}

impl Planner {
    pub fn new(model: Arc<dyn ModelService>, tracer: Arc<dyn Tracer>) -> Self {
        Self {
            model,
            tracer,
            max_steps: MAX_PLAN_STEPS,
        }
    }

    /// 步数上限，限制在 1..=6
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.clamp(1, MAX_PLAN_STEPS);
        self
    }

    /// 总是返回非空计划
    pub async fn plan(&self, query: &str) -> Vec<PlanStep> {
        let request = ModelRequest::without_tools(vec![
            ConversationItem::system(PLANNER_SYSTEM),
            ConversationItem::user(query),
        ]);

        let steps = match self.model.respond(&request).await {
            Ok(response) => {
                let raw = response.collect_text();
                self.tracer.log("planner.raw", json!({ "text": preview(&raw, 500) }));
                parse_plan(&raw, self.max_steps).unwrap_or_else(|e| {
                    record_fallback(self.tracer.as_ref(), "planner", &e);
                    vec![PlanStep::fallback()]
                })
            }
            Err(e) => {
                record_fallback(self.tracer.as_ref(), "planner", &AgentError::ModelService(e));
                vec![PlanStep::fallback()]
            }
        };

        tracing::info!(steps = steps.len(), "plan ready");
        self.tracer.log("planner.steps", json!({ "steps": steps }));
        steps
    }
}
