//! Agent 编排器：单次运行的状态机
//!
//! ROUTE → (DIRECT_ANSWER | PLAN → EXECUTE | EXECUTE) → FINAL，任一非终态可转入 STOP。
//! 每次 `run` 都创建全新的状态机与对话记录，多个运行之间不共享可变状态。

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc::UnboundedSender;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::core::{AgentError, RunState, StateMachine};
use crate::llm::{ModelRequest, ModelService, TimeoutModelService};
use crate::memory::{ConversationItem, ConversationLog};
use crate::observability::{preview, record_fallback, Tracer};
use crate::react::planner::MAX_PLAN_STEPS;
use crate::react::prompts::DIRECT_ANSWER_SYSTEM;
use crate::react::{
    Executor, ExecutorConfig, LoopExit, PlanStep, Planner, ReactEvent, Route, RouteDecision, Router,
};
use crate::tools::ToolRegistry;

/// 直接回答为空时的答案
pub const NO_ANSWER: &str = "no answer.";
/// 运行进入 STOP 时的答案
pub const STOPPED_ANSWER: &str = "stopped without a final answer.";

/// 编排参数
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_tool_steps: usize,
    pub enable_planner: bool,
    pub stream: bool,
    pub max_plan_steps: usize,
    /// 单次模型请求超时；None 表示不限
    pub request_timeout: Option<Duration>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_steps: 10,
            enable_planner: true,
            stream: false,
            max_plan_steps: MAX_PLAN_STEPS,
            request_timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl From<&AppConfig> for AgentConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            max_tool_steps: cfg.agent.max_tool_steps,
            enable_planner: cfg.agent.enable_planner,
            stream: cfg.agent.stream,
            max_plan_steps: cfg.agent.max_plan_steps.clamp(1, MAX_PLAN_STEPS),
            request_timeout: cfg.llm.request_timeout(),
        }
    }
}

/// 单次运行的结果
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub answer: String,
    /// 终态：FINAL 或 STOP
    pub state: RunState,
    /// 走过的状态路径（含初始 ROUTE 与终态）
    pub path: Vec<RunState>,
    pub decision: Option<RouteDecision>,
    pub plan: Vec<PlanStep>,
    pub exit: Option<LoopExit>,
    /// 执行阶段的对话记录；直接回答路线为空
    pub log: ConversationLog,
}

impl RunOutcome {
    pub fn is_final(&self) -> bool {
        self.state == RunState::Final
    }
}

/// ROUTE 之后的下一个状态
pub fn next_after_route(decision: &RouteDecision, enable_planner: bool) -> RunState {
    match decision.route {
        Route::Direct => RunState::DirectAnswer,
        Route::React if enable_planner => RunState::Plan,
        Route::React => RunState::Execute,
    }
}

/// 运行期间累积的数据
#[derive(Default)]
struct RunContext {
    events: Option<UnboundedSender<ReactEvent>>,
    decision: Option<RouteDecision>,
    plan: Vec<PlanStep>,
    answer: Option<String>,
    exit: Option<LoopExit>,
    log: ConversationLog,
}

fn send_event(tx: &Option<UnboundedSender<ReactEvent>>, ev: ReactEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

pub struct Orchestrator {
    model: Arc<dyn ModelService>,
    registry: Arc<ToolRegistry>,
    tracer: Arc<dyn Tracer>,
    config: AgentConfig,
    event_tx: Option<UnboundedSender<ReactEvent>>,
}

impl Orchestrator {
    /// 模型服务按 request_timeout 包装超时
    pub fn new(
        model: Arc<dyn ModelService>,
        registry: Arc<ToolRegistry>,
        tracer: Arc<dyn Tracer>,
        config: AgentConfig,
    ) -> Self {
        let model: Arc<dyn ModelService> = match config.request_timeout {
            Some(t) => Arc::new(TimeoutModelService::new(model, t)),
            None => model,
        };
        Self {
            model,
            registry,
            tracer,
            config,
            event_tx: None,
        }
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 跑完一次完整流程；总是返回结果，错误已在内部降级或转为 STOP
    pub async fn run(&self, query: &str) -> RunOutcome {
        self.run_inner(query, self.event_tx.clone()).await
    }

    /// 同 `run`，过程事件发送到本次运行专属的通道
    pub async fn run_with_events(&self, query: &str, tx: UnboundedSender<ReactEvent>) -> RunOutcome {
        self.run_inner(query, Some(tx)).await
    }

    async fn run_inner(&self, query: &str, events: Option<UnboundedSender<ReactEvent>>) -> RunOutcome {
        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("run", run_id = %run_id);
        self.drive(run_id, query, events).instrument(span).await
    }

    async fn drive(
        &self,
        run_id: String,
        query: &str,
        events: Option<UnboundedSender<ReactEvent>>,
    ) -> RunOutcome {
        self.tracer.log(
            "fsm.reset",
            json!({ "run_id": run_id, "query": preview(query, 200) }),
        );

        let mut machine = StateMachine::new();
        let mut ctx = RunContext {
            events,
            ..RunContext::default()
        };

        loop {
            let state = machine.current();
            self.enter(state, &ctx);
            if state.is_terminal() {
                break;
            }

            let next = match state {
                RunState::Route => self.route(query, &mut ctx).await,
                RunState::Plan => self.plan(query, &mut ctx).await,
                RunState::DirectAnswer => self.direct_answer(query, &mut ctx).await,
                RunState::Execute => self.execute(query, &mut ctx).await,
                RunState::Final | RunState::Stop => break,
            };

            if let Err(e) = machine.advance(next) {
                self.fallback("fsm", &e, &ctx);
                if machine.advance(RunState::Stop).is_err() {
                    break;
                }
            }
        }

        let state = machine.current();
        let answer = match (state, ctx.answer) {
            (RunState::Final, Some(answer)) => answer,
            _ => STOPPED_ANSWER.to_string(),
        };
        if state == RunState::Stop {
            send_event(&ctx.events, ReactEvent::Error {
                text: STOPPED_ANSWER.to_string(),
            });
        }
        tracing::info!(state = %state, answer = %preview(&answer, 120), "run finished");

        RunOutcome {
            run_id,
            answer,
            state,
            path: machine.history().to_vec(),
            decision: ctx.decision,
            plan: ctx.plan,
            exit: ctx.exit,
            log: ctx.log,
        }
    }

    fn enter(&self, state: RunState, ctx: &RunContext) {
        tracing::debug!(state = %state, "enter state");
        self.tracer.log("fsm.state", json!({ "state": state.as_str() }));
        send_event(&ctx.events, ReactEvent::StateChanged {
            state: state.as_str().to_string(),
        });
    }

    async fn route(&self, query: &str, ctx: &mut RunContext) -> RunState {
        let router = Router::new(self.model.clone(), self.registry.tool_names(), self.tracer.clone());
        let decision = router.decide(query).await;
        let next = next_after_route(&decision, self.config.enable_planner);
        ctx.decision = Some(decision);
        next
    }

    async fn plan(&self, query: &str, ctx: &mut RunContext) -> RunState {
        let planner =
            Planner::new(self.model.clone(), self.tracer.clone()).with_max_steps(self.config.max_plan_steps);
        ctx.plan = planner.plan(query).await;
        RunState::Execute
    }

    async fn direct_answer(&self, query: &str, ctx: &mut RunContext) -> RunState {
        let request = ModelRequest::without_tools(vec![
            ConversationItem::system(DIRECT_ANSWER_SYSTEM),
            ConversationItem::user(query),
        ]);
        match self.model.respond(&request).await {
            Ok(response) => {
                let mut text = response.collect_text();
                if text.is_empty() {
                    self.fallback("direct_answer", &AgentError::NoDirectAnswer, ctx);
                    text = NO_ANSWER.to_string();
                }
                send_event(&ctx.events, ReactEvent::MessageChunk { text: text.clone() });
                send_event(&ctx.events, ReactEvent::MessageDone);
                ctx.answer = Some(text);
                RunState::Final
            }
            Err(e) => {
                self.fallback("direct_answer", &AgentError::ModelService(e), ctx);
                RunState::Stop
            }
        }
    }

    async fn execute(&self, query: &str, ctx: &mut RunContext) -> RunState {
        let config = ExecutorConfig {
            max_tool_steps: self.config.max_tool_steps,
            stream: self.config.stream,
        };
        let mut executor = Executor::new(self.model.as_ref(), &self.registry, self.tracer.as_ref(), config);
        if let Some(tx) = &ctx.events {
            executor = executor.with_event_tx(tx);
        }
        let result = executor.execute(query, &ctx.plan).await;

        match result {
            Ok(outcome) => {
                ctx.answer = Some(outcome.answer);
                ctx.exit = Some(outcome.exit);
                ctx.log = outcome.log;
                RunState::Final
            }
            Err(e) => {
                self.fallback("execute", &e, ctx);
                RunState::Stop
            }
        }
    }

    fn fallback(&self, stage: &str, err: &AgentError, ctx: &RunContext) {
        record_fallback(self.tracer.as_ref(), stage, err);
        send_event(&ctx.events, ReactEvent::Fallback {
            stage: stage.to_string(),
            error: err.tag().to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModelService, ModelError, ModelResponse};
    use crate::observability::MemoryTracer;
    use crate::tools::default_registry;

    fn orchestrator(model: Arc<MockModelService>, config: AgentConfig) -> (Orchestrator, Arc<MemoryTracer>) {
        let tracer = Arc::new(MemoryTracer::new());
        let orch = Orchestrator::new(model, Arc::new(default_registry()), tracer.clone(), config);
        (orch, tracer)
    }

    #[test]
    fn test_next_after_route() {
        let mut d = RouteDecision::fallback();
        assert_eq!(next_after_route(&d, true), RunState::Plan);
        assert_eq!(next_after_route(&d, false), RunState::Execute);
        d.route = Route::Direct;
        assert_eq!(next_after_route(&d, true), RunState::DirectAnswer);
    }

    #[test]
    fn test_agent_config_from_app_config() {
        let mut app = AppConfig::default();
        app.agent.max_plan_steps = 42;
        app.llm.request_timeout_secs = 0;
        let cfg = AgentConfig::from(&app);
        assert_eq!(cfg.max_plan_steps, 6);
        assert_eq!(cfg.request_timeout, None);
    }

    #[tokio::test]
    async fn test_direct_path() {
        let model = Arc::new(MockModelService::new(vec![
            ModelResponse::text(r#"{"route":"direct","tools":[],"reason":"greeting"}"#),
            ModelResponse::text("Hello!"),
        ]));
        let (orch, tracer) = orchestrator(model.clone(), AgentConfig::default());

        let outcome = orch.run("hi").await;
        assert_eq!(outcome.answer, "Hello!");
        assert_eq!(outcome.path, vec![RunState::Route, RunState::DirectAnswer, RunState::Final]);
        assert!(outcome.log.is_empty());
        assert_eq!(model.request_count(), 2);
        assert!(model.requests()[1].tools.is_none());
        assert_eq!(tracer.kinds()[0], "fsm.reset");
    }

    #[tokio::test]
    async fn test_direct_empty_answer() {
        let model = Arc::new(MockModelService::new(vec![
            ModelResponse::text(r#"{"route":"direct"}"#),
            ModelResponse::empty(),
        ]));
        let (orch, tracer) = orchestrator(model, AgentConfig::default());

        let outcome = orch.run("hi").await;
        assert_eq!(outcome.answer, NO_ANSWER);
        assert!(outcome.is_final());
        assert_eq!(tracer.fallbacks(), vec!["no_direct_answer"]);
    }

    #[tokio::test]
    async fn test_planner_disabled_skips_plan() {
        let model = Arc::new(MockModelService::new(vec![
            ModelResponse::text(r#"{"route":"react","tools":["calculator"]}"#),
            ModelResponse::text("4"),
        ]));
        let config = AgentConfig {
            enable_planner: false,
            ..AgentConfig::default()
        };
        let (orch, _) = orchestrator(model.clone(), config);

        let outcome = orch.run("2+2").await;
        assert_eq!(outcome.path, vec![RunState::Route, RunState::Execute, RunState::Final]);
        assert!(outcome.plan.is_empty());
        // system + user，没有计划指引
        assert_eq!(model.requests()[1].input.len(), 2);
    }

    #[tokio::test]
    async fn test_model_failure_in_execute_stops() {
        let model = Arc::new(MockModelService::from_results(vec![
            Ok(ModelResponse::text(r#"{"route":"react"}"#)),
            Ok(ModelResponse::text(r#"{"steps":[{"id":1,"goal":"go"}]}"#)),
            Err(ModelError::Transport("reset by peer".to_string())),
        ]));
        let (orch, tracer) = orchestrator(model, AgentConfig::default());

        let outcome = orch.run("q").await;
        assert_eq!(outcome.state, RunState::Stop);
        assert_eq!(outcome.answer, STOPPED_ANSWER);
        assert_eq!(tracer.fallbacks(), vec!["model_service"]);
    }

    #[tokio::test]
    async fn test_request_timeout_stops_run() {
        let model = Arc::new(
            MockModelService::new(vec![ModelResponse::text(r#"{"route":"direct"}"#)])
                .with_delay(Duration::from_millis(200)),
        );
        let config = AgentConfig {
            request_timeout: Some(Duration::from_millis(20)),
            ..AgentConfig::default()
        };
        let (orch, tracer) = orchestrator(model, config);

        let outcome = orch.run("q").await;
        // 路由超时降级为 react，执行阶段再次超时 -> STOP
        assert_eq!(outcome.state, RunState::Stop);
        assert_eq!(tracer.fallbacks(), vec!["model_service", "model_service", "model_service"]);
    }

    #[tokio::test]
    async fn test_events_report_states() {
        let model = Arc::new(MockModelService::new(vec![
            ModelResponse::text(r#"{"route":"direct"}"#),
            ModelResponse::text("ok"),
        ]));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let (orch, _) = orchestrator(model, AgentConfig::default());
        let orch = orch.with_event_tx(tx);

        orch.run("q").await;
        drop(orch);

        let mut states = Vec::new();
        while let Some(ev) = rx.recv().await {
            if let ReactEvent::StateChanged { state } = ev {
                states.push(state);
            }
        }
        assert_eq!(states, vec!["ROUTE", "DIRECT_ANSWER", "FINAL"]);
    }
}
