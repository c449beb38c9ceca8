//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按名注册；
//! dispatch 负责查找、参数校验、超时与 panic 捕获，并把一切失败折叠为结构化 Observation。
//! 模型给出的参数是不可信输入，任何单个工具的故障都不会越过注册表边界。

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolSpec;
use crate::observability::preview;
use crate::tools::schema::{empty_object_schema, validate_arguments};
use crate::tools::{ToolFault, ToolResult};

const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;
const ARGS_PREVIEW_CHARS: usize = 200;

/// 工具 trait：名称、描述（供模型理解）、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（模型 tool call 中的 name）
    fn name(&self) -> &str;

    /// 工具描述
    fn description(&self) -> &str;

    /// 参数 JSON Schema；默认无参数
    fn parameters_schema(&self) -> Value {
        empty_object_schema()
    }

    /// 执行工具；业务失败返回 Ok(ToolResult::Failure)，参数不符或内部故障返回 ToolFault
    async fn execute(&self, args: Value) -> Result<ToolResult, ToolFault>;
}

/// 工具注册表：保持注册顺序，同名重复注册时原位替换
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
    timeout: Duration,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
            timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
        }
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 单次工具调用超时
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        let tool: Arc<dyn Tool> = Arc::new(tool);
        match self.index.get(&name) {
            Some(&i) => self.tools[i] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| self.tools[i].clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// 能力描述表：由已注册工具动态生成
    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec::function(t.name(), t.description(), t.parameters_schema()))
            .collect()
    }

    /// 执行工具并返回 Observation 文本；从不返回错误；每次调用输出 JSON 审计日志
    pub async fn dispatch(&self, name: &str, args: Map<String, Value>) -> String {
        let start = Instant::now();
        let args_preview = preview(&Value::Object(args.clone()).to_string(), ARGS_PREVIEW_CHARS);

        let result = self.try_dispatch(name, args).await;

        let outcome = match &result {
            Ok(r) if r.is_ok() => "ok",
            Ok(_) => "failure",
            Err(e) => e.tag(),
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": name,
            "ok": matches!(&result, Ok(r) if r.is_ok()),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        result
            .unwrap_or_else(|e| ToolResult::failure(e.to_string()))
            .to_payload()
    }

    async fn try_dispatch(
        &self,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<ToolResult, AgentError> {
        let tool = self
            .get(name)
            .ok_or_else(|| AgentError::ToolNotFound(name.to_string()))?;

        validate_arguments(&tool.parameters_schema(), &args).map_err(AgentError::ToolArguments)?;

        let guarded = AssertUnwindSafe(tool.execute(Value::Object(args))).catch_unwind();
        match timeout(self.timeout, guarded).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(ToolFault::BadArguments(msg)))) => Err(AgentError::ToolArguments(msg)),
            Ok(Ok(Err(ToolFault::Failed { category, message }))) => {
                Err(AgentError::ToolExecution { category, message })
            }
            Ok(Err(panic)) => Err(AgentError::ToolExecution {
                category: "panic".to_string(),
                message: panic_message(panic.as_ref()),
            }),
            Err(_) => Err(AgentError::ToolExecution {
                category: "timeout".to_string(),
                message: format!("no result within {:?}", self.timeout),
            }),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{CalculatorTool, LookupDocTool};
    use serde_json::json;

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "boom"
        }
        fn description(&self) -> &str {
            "always panics"
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult, ToolFault> {
            panic!("kaboom")
        }
    }

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }
        fn description(&self) -> &str {
            "sleeps"
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult, ToolFault> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(ToolResult::success("done", true))
        }
    }

    struct FaultyTool;

    #[async_trait]
    impl Tool for FaultyTool {
        fn name(&self) -> &str {
            "faulty"
        }
        fn description(&self) -> &str {
            "returns an io fault"
        }
        async fn execute(&self, _args: Value) -> Result<ToolResult, ToolFault> {
            Err(ToolFault::failed("io", "disk on fire"))
        }
    }

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn parse(payload: &str) -> Value {
        serde_json::from_str(payload).unwrap()
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new().with_timeout(Duration::from_millis(50));
        r.register(CalculatorTool);
        r.register(LookupDocTool);
        r.register(PanicTool);
        r.register(SlowTool);
        r.register(FaultyTool);
        r
    }

    #[tokio::test]
    async fn test_dispatch_calculator() {
        let out = registry()
            .dispatch("calculator", obj(json!({"expression": "2+2"})))
            .await;
        assert_eq!(parse(&out), json!({"ok": true, "result": 4}));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_structured_error() {
        let out = registry().dispatch("weather", Map::new()).await;
        assert_eq!(parse(&out), json!({"ok": false, "error": "unknown tool: weather"}));
    }

    #[tokio::test]
    async fn test_missing_argument_is_bad_arguments() {
        let out = registry().dispatch("calculator", Map::new()).await;
        let v = parse(&out);
        assert_eq!(v["ok"], false);
        assert!(v["error"].as_str().unwrap().starts_with("bad arguments:"));
    }

    #[tokio::test]
    async fn test_unexpected_argument_is_bad_arguments() {
        let out = registry()
            .dispatch("lookup_doc", obj(json!({"query": "fsm", "page": 2})))
            .await;
        assert!(parse(&out)["error"].as_str().unwrap().contains("unexpected parameter"));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let out = registry().dispatch("boom", Map::new()).await;
        assert_eq!(
            parse(&out),
            json!({"ok": false, "error": "execution failed: panic: kaboom"})
        );
    }

    #[tokio::test]
    async fn test_timeout_is_execution_failure() {
        let out = registry().dispatch("slow", Map::new()).await;
        let err = parse(&out)["error"].as_str().unwrap().to_string();
        assert!(err.starts_with("execution failed: timeout:"), "{err}");
    }

    #[tokio::test]
    async fn test_fault_carries_category() {
        let out = registry().dispatch("faulty", Map::new()).await;
        assert_eq!(parse(&out)["error"], "execution failed: io: disk on fire");
    }

    #[test]
    fn test_specs_follow_registration_order() {
        let r = registry();
        let names: Vec<String> = r.specs().into_iter().map(|s| s.name).collect();
        assert_eq!(names, r.tool_names());
        assert_eq!(names[0], "calculator");
        assert_eq!(r.specs()[0].parameters["required"], json!(["expression"]));
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let mut r = ToolRegistry::new();
        r.register(CalculatorTool);
        r.register(LookupDocTool);
        r.register(CalculatorTool);
        assert_eq!(r.len(), 2);
        assert_eq!(r.tool_names(), vec!["calculator", "lookup_doc"]);
    }
}
