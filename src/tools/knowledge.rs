//! lookup_doc 工具：内置的小型知识库检索（键名子串匹配）

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::tools::schema::parameters_schema_for;
use crate::tools::{Tool, ToolFault, ToolResult};

/// (键, 文档)；查询文本（小写）包含键即命中
const KNOWLEDGE_BASE: &[(&str, &str)] = &[
    (
        "react",
        "ReAct（推理 + 行动）：模型边推理边按需调用工具，把工具结果当作观察继续推理，直到给出答案。",
    ),
    (
        "fsm",
        "FSM（有限状态机）：由状态集合与转移规则组成，智能体可以用它编排 路由 → 规划 → 执行 的流程。",
    ),
    (
        "responses api",
        "Responses API：输入与输出都是 item 列表，原生支持工具调用（function_call / function_call_output）。",
    ),
];

/// lookup_doc 参数
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct LookupDocArgs {
    /// 检索关键词
    pub query: String,
}

/// 返回所有命中文档；无命中时 hits 为空数组
pub fn lookup(query: &str) -> Vec<&'static str> {
    let q = query.trim().to_lowercase();
    KNOWLEDGE_BASE
        .iter()
        .filter(|(key, _)| q.contains(key))
        .map(|(_, doc)| *doc)
        .collect()
}

pub struct LookupDocTool;

#[async_trait]
impl Tool for LookupDocTool {
    fn name(&self) -> &str {
        "lookup_doc"
    }

    fn description(&self) -> &str {
        "Lookup internal docs/KB. Returns JSON with {ok,hits}."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<LookupDocArgs>()
    }

    async fn execute(&self, args: Value) -> Result<ToolResult, ToolFault> {
        let args: LookupDocArgs = serde_json::from_value(args)?;
        Ok(ToolResult::success("hits", lookup(&args.query)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(lookup("What is an FSM?").len(), 1);
        assert_eq!(lookup("ReAct with the Responses API").len(), 2);
        assert!(lookup("weather").is_empty());
    }

    #[tokio::test]
    async fn test_empty_hits_still_ok() {
        let r = LookupDocTool.execute(json!({"query": "nothing"})).await.unwrap();
        assert_eq!(r.to_value(), json!({"ok": true, "hits": []}));
    }
}
