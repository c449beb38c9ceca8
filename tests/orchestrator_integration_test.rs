//! 状态机端到端集成测试：Mock 模型服务驱动完整运行

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;
    use fsm_agent::core::{AgentConfig, Orchestrator, RunState};
    use fsm_agent::llm::{MockModelService, ModelResponse};
    use fsm_agent::memory::ConversationItem;
    use fsm_agent::observability::MemoryTracer;
    use fsm_agent::react::{
        LoopExit, PlanStep, Planner, Route, RouteDecision, Router, MAX_STEPS_FALLBACK,
    };
    use fsm_agent::tools::{default_registry, Tool, ToolFault, ToolResult};
    use serde_json::{json, Map, Value};

    fn route_react() -> ModelResponse {
        ModelResponse::text(r#"{"route":"react","tools":["calculator","lookup_doc"],"reason":"needs math"}"#)
    }

    fn plan_one() -> ModelResponse {
        ModelResponse::text(r#"{"steps":[{"id":1,"goal":"compute","tool_hint":"calculator"}]}"#)
    }

    fn calc_call(expr: &str, id: &str) -> ConversationItem {
        ConversationItem::tool_call("calculator", json!({ "expression": expr }).to_string(), id)
    }

    fn build(model: Arc<MockModelService>, config: AgentConfig) -> (Orchestrator, Arc<MemoryTracer>) {
        let tracer = Arc::new(MemoryTracer::new());
        let orch = Orchestrator::new(model, Arc::new(default_registry()), tracer.clone(), config);
        (orch, tracer)
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_calculator_scenarios() {
        let registry = default_registry();

        let ok: Value = serde_json::from_str(
            &registry.dispatch("calculator", args(json!({"expression": "2+2"}))).await,
        )
        .unwrap();
        assert_eq!(ok, json!({"ok": true, "result": 4}));

        let bad: Value = serde_json::from_str(
            &registry.dispatch("calculator", args(json!({"expression": "2+a"}))).await,
        )
        .unwrap();
        assert_eq!(bad, json!({"ok": false, "error": "illegal characters"}));
    }

    #[tokio::test]
    async fn test_router_prose_falls_back() {
        let model = Arc::new(MockModelService::new(vec![ModelResponse::text(
            "Sure! This looks like a math question.",
        )]));
        let tracer = Arc::new(MemoryTracer::new());
        let router = Router::new(model, vec!["calculator".to_string()], tracer.clone());

        let decision = router.decide("2+2?").await;
        assert_eq!(decision.route, Route::React);
        assert!(decision.tools.is_empty());
        assert_eq!(decision.reason, "no reason provided");
        assert_eq!(decision, RouteDecision::fallback());
        assert_eq!(tracer.fallbacks(), vec!["router_decode"]);
    }

    #[tokio::test]
    async fn test_planner_empty_steps_falls_back() {
        let model = Arc::new(MockModelService::new(vec![ModelResponse::text(r#"{"steps": []}"#)]));
        let tracer = Arc::new(MemoryTracer::new());
        let steps = Planner::new(model, tracer.clone()).plan("anything").await;

        assert_eq!(
            steps,
            vec![PlanStep {
                id: 1,
                goal: "Solve the user's request".to_string(),
                tool_hint: String::new(),
            }]
        );
        assert_eq!(tracer.fallbacks(), vec!["planner_decode"]);
    }

    #[tokio::test]
    async fn test_endless_tool_calls_hit_budget() {
        // 脚本耗尽后一直请求工具
        let model = Arc::new(
            MockModelService::from_results(vec![Ok(route_react()), Ok(plan_one())])
                .with_repeat(ModelResponse::new(vec![calc_call("1+1", "again")])),
        );
        let config = AgentConfig {
            max_tool_steps: 4,
            ..AgentConfig::default()
        };
        let (orch, tracer) = build(model.clone(), config);

        let outcome = orch.run("keep calculating").await;
        assert_eq!(outcome.answer, MAX_STEPS_FALLBACK);
        assert_eq!(outcome.state, RunState::Final);
        assert_eq!(outcome.exit, Some(LoopExit::BudgetExhausted));
        // router + planner + 4 次执行请求
        assert_eq!(model.request_count(), 6);
        assert_eq!(tracer.fallbacks(), vec!["step_budget_exceeded"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_observation_and_loop_continues() {
        let model = Arc::new(MockModelService::new(vec![
            route_react(),
            plan_one(),
            ModelResponse::new(vec![ConversationItem::tool_call(
                "weather",
                r#"{"city":"Paris"}"#,
                "w1",
            )]),
            ModelResponse::text("I cannot check the weather."),
        ]));
        let (orch, _) = build(model.clone(), AgentConfig::default());

        let outcome = orch.run("weather in Paris?").await;
        assert_eq!(outcome.answer, "I cannot check the weather.");
        assert_eq!(outcome.exit, Some(LoopExit::FinalText));

        let observation = outcome
            .log
            .items()
            .iter()
            .find_map(|item| match item {
                ConversationItem::ToolOutput { call_id, output } if call_id == "w1" => Some(output.clone()),
                _ => None,
            })
            .unwrap();
        let observation: Value = serde_json::from_str(&observation).unwrap();
        assert_eq!(observation, json!({"ok": false, "error": "unknown tool: weather"}));
    }

    #[tokio::test]
    async fn test_full_react_path_with_plan() {
        let model = Arc::new(MockModelService::new(vec![
            route_react(),
            plan_one(),
            ModelResponse::new(vec![calc_call("17*23+4", "c1")]),
            ModelResponse::text("17*23+4 = 395"),
        ]));
        let (orch, tracer) = build(model.clone(), AgentConfig::default());

        let outcome = orch.run("What is 17*23+4?").await;
        assert_eq!(outcome.answer, "17*23+4 = 395");
        assert_eq!(
            outcome.path,
            vec![RunState::Route, RunState::Plan, RunState::Execute, RunState::Final]
        );
        assert_eq!(outcome.plan.len(), 1);
        assert!(outcome.decision.unwrap().tools.contains("calculator"));
        assert!(tracer.fallbacks().is_empty());

        let kinds = tracer.kinds();
        for kind in [
            "fsm.reset",
            "router.raw",
            "router.decision",
            "planner.raw",
            "planner.steps",
            "executor.llm.request",
            "executor.tool_calls",
            "tool.call",
            "tool.result",
            "executor.text",
        ] {
            assert!(kinds.iter().any(|k| k == kind), "missing trace kind {kind}");
        }
        let result = &tracer.data_of("tool.result")[0];
        assert_eq!(result["call_id"], "c1");
        assert!(result["output"].as_str().unwrap().contains("395"));
    }

    /// 执行阶段的每次请求快照都是下一次快照的严格前缀
    #[tokio::test]
    async fn test_snapshot_prefix_law() {
        let model = Arc::new(MockModelService::new(vec![
            route_react(),
            plan_one(),
            ModelResponse::new(vec![calc_call("2*3", "a"), calc_call("4/0", "b")]),
            ModelResponse::new(vec![
                ConversationItem::assistant("checking the docs"),
                ConversationItem::tool_call("lookup_doc", r#"{"query":"fsm"}"#, "c"),
            ]),
            ModelResponse::text("done"),
        ]));
        let (orch, _) = build(model.clone(), AgentConfig::default());
        orch.run("prefix").await;

        let snapshots: Vec<Vec<ConversationItem>> = model
            .requests()
            .into_iter()
            .filter(|r| r.tools.is_some())
            .map(|r| r.input)
            .collect();
        assert_eq!(snapshots.len(), 3);
        for pair in snapshots.windows(2) {
            assert!(pair[0].len() < pair[1].len());
            assert_eq!(pair[0][..], pair[1][..pair[0].len()]);
        }
    }

    /// 每个工具调用在下一次请求之前恰好有一个对应的 tool_output
    #[tokio::test]
    async fn test_call_output_correlation_law() {
        let model = Arc::new(MockModelService::new(vec![
            route_react(),
            plan_one(),
            ModelResponse::new(vec![
                calc_call("1+1", "x1"),
                ConversationItem::ToolCall {
                    name: "calculator".to_string(),
                    arguments: r#"{"expression":"3**2"}"#.to_string(),
                    call_id: None,
                    item_id: Some("fc_item".to_string()),
                },
                ConversationItem::ToolCall {
                    name: "lookup_doc".to_string(),
                    arguments: "not json".to_string(),
                    call_id: None,
                    item_id: None,
                },
            ]),
            ModelResponse::text("all done"),
        ]));
        let (orch, _) = build(model.clone(), AgentConfig::default());
        let outcome = orch.run("correlate").await;
        assert_eq!(outcome.answer, "all done");

        let last_request = model.requests().pop().unwrap();
        let mut outputs: HashMap<String, usize> = HashMap::new();
        let mut calls = Vec::new();
        for (pos, item) in last_request.input.iter().enumerate() {
            match item {
                ConversationItem::ToolCall { call_id, .. } => {
                    calls.push((pos, call_id.clone().expect("call id resolved")))
                }
                ConversationItem::ToolOutput { call_id, .. } => {
                    *outputs.entry(call_id.clone()).or_default() += 1;
                    let call_pos = calls.iter().find(|(_, id)| id == call_id).map(|(p, _)| *p);
                    assert!(call_pos.is_some_and(|p| p < pos), "output before its call: {call_id}");
                }
                _ => {}
            }
        }
        let ids: Vec<&str> = calls.iter().map(|(_, id)| id.as_str()).collect();
        assert_eq!(ids, vec!["x1", "fc_item", "call_0_2"]);
        for id in ids {
            assert_eq!(outputs.get(id), Some(&1), "call {id} needs exactly one output");
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str {
            "explode"
        }

        fn description(&self) -> &str {
            "always panics"
        }

        async fn execute(&self, _args: Value) -> Result<ToolResult, ToolFault> {
            panic!("kaboom")
        }
    }

    #[tokio::test]
    async fn test_tool_panic_does_not_escape() {
        let mut registry = default_registry();
        registry.register(PanicTool);
        let model = Arc::new(MockModelService::new(vec![
            ModelResponse::text(r#"{"route":"react","tools":["explode"]}"#),
            plan_one(),
            ModelResponse::new(vec![ConversationItem::tool_call("explode", "{}", "p1")]),
            ModelResponse::text("recovered"),
        ]));
        let tracer = Arc::new(MemoryTracer::new());
        let orch = Orchestrator::new(model, Arc::new(registry), tracer, AgentConfig::default());

        let outcome = orch.run("boom").await;
        assert_eq!(outcome.answer, "recovered");
        let output = outcome
            .log
            .items()
            .iter()
            .find_map(|i| match i {
                ConversationItem::ToolOutput { output, .. } => Some(output.clone()),
                _ => None,
            })
            .unwrap();
        assert!(output.contains("execution failed: panic"));
    }

    #[tokio::test]
    async fn test_runs_do_not_share_state() {
        let model = Arc::new(
            MockModelService::new(vec![]).with_repeat(ModelResponse::text(r#"{"route":"react"}"#)),
        );
        let config = AgentConfig {
            enable_planner: false,
            ..AgentConfig::default()
        };
        let (orch, _) = build(model, config);

        let first = orch.run("first question").await;
        let second = orch.run("second question").await;
        assert_ne!(first.run_id, second.run_id);
        assert_eq!(second.log.len(), 2);
        assert!(!second
            .log
            .items()
            .iter()
            .any(|i| matches!(i, ConversationItem::Message { content, .. } if content.contains("first"))));
    }
}
