//! 固定指令文本（Router / Planner / Executor / 直接回答）

/// Router 指令；`{tools}` 由可用工具名替换
const ROUTER_TEMPLATE: &str = r#"You are the router of a tool-using agent.

Decide whether the user's request needs tools, and which ones.
Available tools: {tools}

Reply with a single JSON object and nothing else:
{"route": "direct" | "react", "tools": ["<tool name>", ...], "reason": "<one short sentence>"}
Use "direct" only when the answer needs no tool at all. Only list tools from the available list.
No markdown, no extra keys."#;

pub const PLANNER_SYSTEM: &str = r#"You are the planner of a tool-using agent.

Split the user's request into 1 to 6 concrete steps, in order.
Reply with a single JSON object and nothing else:
{"steps": [{"id": 1, "goal": "<what to achieve>", "tool_hint": "<tool name or empty string>"}]}
No markdown, no extra keys."#;

pub const EXECUTOR_SYSTEM: &str = r#"You are the executor of a ReAct agent.

- Call tools whenever they help; never guess a number you could compute.
- Use calculator for arithmetic and lookup_doc for internal documentation.
- Read every tool result before deciding the next action.
- A plan may be provided as guidance; follow it when useful, deviate when needed.
- When you have enough information, reply with the final answer in plain text, concisely."#;

pub const DIRECT_ANSWER_SYSTEM: &str = "You answer directly without tools. Be concise and correct.";

pub fn router_system(tool_names: &[String]) -> String {
    let tools = if tool_names.is_empty() {
        "(none)".to_string()
    } else {
        tool_names.join(", ")
    };
    ROUTER_TEMPLATE.replace("{tools}", &tools)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_system_lists_tools() {
        let s = router_system(&["calculator".to_string(), "lookup_doc".to_string()]);
        assert!(s.contains("Available tools: calculator, lookup_doc"));
        assert!(router_system(&[]).contains("(none)"));
    }
}
